//! Scope frames for the interpreter.
//!
//! Frames are shared as `Rc<RefCell<Environment>>`: a closure keeps the frame
//! it was created in alive, and every closure over the same frame sees the
//! others' writes. Children point at parents only, so chains never form a
//! cycle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::error::{LoxError, Result, RuntimeErrorKind};
use crate::token::Token;
use crate::value::Value;

/// A binding in a frame: `None` means declared without a value (`var a;`).
pub type Slot = Option<Value>;

#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Slot>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

fn undefined(name: &Token) -> LoxError {
    LoxError::runtime(
        RuntimeErrorKind::UndefinedVariable,
        name,
        format!("Undefined variable '{}'.", name.lexeme),
    )
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wraps a fresh child of `enclosing` for sharing.
    pub fn child_of(enclosing: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::with_enclosing(enclosing.clone())))
    }

    /// Binds `name` in this frame, replacing any previous binding here.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), Some(value));
    }

    /// Binds `name` in this frame without a value.
    pub fn declare(&mut self, name: &str) {
        self.values.insert(name.to_string(), None);
    }

    /// Value bound to `name` in this frame only, ignoring unassigned slots.
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned().flatten()
    }

    /// Looks `name` up here, then in each enclosing frame.
    pub fn get(&self, name: &Token) -> Result<Slot> {
        if let Some(slot) = self.values.get(&name.lexeme) {
            Ok(slot.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(undefined(name))
        }
    }

    /// Overwrites the nearest existing binding of `name`. Never creates one.
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<()> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = Some(value);
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(undefined(name))
        }
    }

    /// The frame exactly `depth` links out from `env`.
    pub fn ancestor(
        env: &Rc<RefCell<Environment>>,
        depth: usize,
    ) -> Option<Rc<RefCell<Environment>>> {
        let mut environment = env.clone();

        for _ in 0..depth {
            let next = environment.borrow().enclosing.clone()?;
            environment = next;
        }

        Some(environment)
    }

    /// Reads `name` from the frame `depth` links out, without delegating.
    pub fn get_at(env: &Rc<RefCell<Environment>>, depth: usize, name: &Token) -> Result<Slot> {
        debug!("get_at depth={} name={}", depth, name.lexeme);

        let frame = Self::ancestor(env, depth).ok_or_else(|| undefined(name))?;
        let frame = frame.borrow();

        frame
            .values
            .get(&name.lexeme)
            .cloned()
            .ok_or_else(|| undefined(name))
    }

    /// Writes `name` in the frame `depth` links out, without delegating.
    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        depth: usize,
        name: &Token,
        value: Value,
    ) -> Result<()> {
        debug!("assign_at depth={} name={}", depth, name.lexeme);

        let frame = Self::ancestor(env, depth).ok_or_else(|| undefined(name))?;
        let mut frame = frame.borrow_mut();

        match frame.values.get_mut(&name.lexeme) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(undefined(name)),
        }
    }
}
