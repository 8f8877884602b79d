//! Classes and their instances.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::error::{LoxError, Result, RuntimeErrorKind};
use crate::function::{Callable, LoxFunction};
use crate::interpreter::Interpreter;
use crate::token::Token;
use crate::value::Value;

const INITIALIZER: &str = "init";

/// A class: its methods plus an optional, shared superclass.
pub struct LoxClass {
    name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, Rc<LoxFunction>>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks in this class first, then up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        match self.methods.get(name) {
            Some(method) => Some(method.clone()),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name)),
        }
    }
}

impl Callable for Rc<LoxClass> {
    fn arity(&self) -> usize {
        self.find_method(INITIALIZER)
            .map_or(0, |init| init.arity())
    }

    fn call(&self, interpreter: &mut Interpreter, paren: &Token, arguments: Vec<Value>) -> Result<Value> {
        debug!("Instantiating class '{}'", self.name);

        let instance = Rc::new(LoxInstance::new(self.clone()));

        if let Some(initializer) = self.find_method(INITIALIZER) {
            initializer
                .bind(instance.clone())
                .call(interpreter, paren, arguments)?;
        }

        Ok(Value::Instance(instance))
    }
}

impl fmt::Debug for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.superclass {
            Some(superclass) => write!(f, "<class {} < {}>", self.name, superclass.name),
            None => write!(f, "<class {}>", self.name),
        }
    }
}

/// An object created by calling a class.
pub struct LoxInstance {
    class: Rc<LoxClass>,
    fields: RefCell<HashMap<String, Value>>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        Self {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    pub fn class(&self) -> &Rc<LoxClass> {
        &self.class
    }

    /// Field lookup, falling back to a method bound to this instance.
    pub fn get(self: &Rc<Self>, name: &Token) -> Result<Value> {
        if let Some(value) = self.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }

        if let Some(method) = self.class.find_method(&name.lexeme) {
            return Ok(Value::Function(Rc::new(method.bind(self.clone()))));
        }

        Err(LoxError::runtime(
            RuntimeErrorKind::UndefinedProperty,
            name,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    /// Always writes this instance's own field, even if a method shares the name.
    pub fn set(&self, name: &Token, value: Value) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), value);
    }
}

impl fmt::Debug for LoxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} instance>", self.class.name)
    }
}
