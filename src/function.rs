//! Callable runtime objects: user functions (closures, bound methods,
//! initializers) and host‑implemented natives.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::class::LoxInstance;
use crate::environment::Environment;
use crate::error::{LoxError, Result, RuntimeErrorKind};
use crate::interpreter::{Flow, Interpreter};
use crate::token::Token;
use crate::value::Value;

/// Anything a call expression can invoke.
pub trait Callable {
    fn arity(&self) -> usize;

    /// Runs the callee. `paren` is the call's closing parenthesis, used to
    /// position errors the callee raises on the caller's behalf.
    fn call(&self, interpreter: &mut Interpreter, paren: &Token, arguments: Vec<Value>)
        -> Result<Value>;
}

/// Host function signature; an `Err` becomes a runtime error at the call site.
pub type NativeFn = fn(&[Value]) -> std::result::Result<Value, String>;

pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new(name: &'static str, arity: usize, func: NativeFn) -> Self {
        Self { name, arity, func }
    }
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(&self, _interpreter: &mut Interpreter, paren: &Token, arguments: Vec<Value>) -> Result<Value> {
        debug!("Calling native function '{}'", self.name);

        (self.func)(&arguments)
            .map_err(|msg| LoxError::runtime(RuntimeErrorKind::Native, paren, msg))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}/{}>", self.name, self.arity)
    }
}

/// A user‑defined function together with the frame it closes over.
pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.declaration.name()
    }

    /// A copy of this method whose `this` is `instance`.
    ///
    /// The new closure is a frame holding only `this`, chained to the original
    /// closure, which is the extra scope the resolver counted for the class
    /// body.
    pub fn bind(&self, instance: Rc<LoxInstance>) -> LoxFunction {
        let environment = Environment::child_of(&self.closure);
        environment
            .borrow_mut()
            .define("this", Value::Instance(instance));

        LoxFunction::new(self.declaration.clone(), environment, self.is_initializer)
    }

    fn bound_this(&self) -> Value {
        self.closure.borrow().get_local("this").unwrap_or(Value::Nil)
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize {
        self.declaration.arity()
    }

    fn call(&self, interpreter: &mut Interpreter, _paren: &Token, arguments: Vec<Value>) -> Result<Value> {
        debug!(
            "Calling user-defined function '{}'",
            self.name().unwrap_or("<anonymous>")
        );

        let environment = Environment::child_of(&self.closure);
        {
            let mut frame = environment.borrow_mut();
            for (param, argument) in self.declaration.params.iter().zip(arguments) {
                frame.define(&param.lexeme, argument);
            }
        }

        let flow = interpreter.execute_block(&self.declaration.body, environment)?;

        if self.is_initializer {
            return Ok(self.bound_this());
        }

        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
        })
    }
}

impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "<fn {}/{}>", name, self.declaration.arity()),
            None => write!(f, "<fn/{}>", self.declaration.arity()),
        }
    }
}
