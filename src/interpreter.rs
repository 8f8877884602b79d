//! Tree‑walking evaluator.
//!
//! The interpreter owns the global frame and a *current* frame that only
//! changes for the dynamic extent of a block, a function body or a class body
//! with a superclass, and is put back afterwards on every path, including
//! errors and early returns.
//!
//! Variable reads and writes consult the binding table the resolver produced:
//! a recorded depth addresses a frame relative to the current one, a missing
//! entry means the name is global.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use chrono::Utc;
use log::{debug, info};

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::class::LoxClass;
use crate::environment::{Environment, Slot};
use crate::error::{LoxError, Result, RuntimeErrorKind};
use crate::function::{LoxFunction, NativeFunction};
use crate::resolver::Locals;
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Calls deeper than this fail with a stack‑overflow runtime error.
///
/// Each Lox call costs several host frames, so the host thread needs a stack
/// of roughly [`EVALUATOR_STACK_SIZE`] to reach this depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

/// Host stack size that lets [`DEFAULT_MAX_CALL_DEPTH`] nested calls run.
pub const EVALUATOR_STACK_SIZE: usize = 1024 * 1024 * 1024;

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    /// A `return` is unwinding to the nearest function call.
    Return(Value),
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: Locals,
    output: Box<dyn Write>,
    strict_unassigned: bool,
    max_call_depth: usize,
    call_depth: usize,
}

fn clock(_args: &[Value]) -> std::result::Result<Value, String> {
    let now = Utc::now();
    let seconds = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;

    debug!("Native function 'clock' returned: {}", seconds);

    Ok(Value::Number(seconds))
}

fn type_error<S: Into<String>>(token: &Token, msg: S) -> LoxError {
    LoxError::runtime(RuntimeErrorKind::Type, token, msg)
}

fn number_operand(operator: &Token, operand: &Value) -> Result<f64> {
    match operand {
        Value::Number(n) => Ok(*n),
        _ => Err(type_error(operator, "Operand must be a number.")),
    }
}

fn number_operands(operator: &Token, left: &Value, right: &Value) -> Result<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(type_error(operator, "Operands must be numbers.")),
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates a new Interpreter and defines native functions such as `clock`.
    pub fn new() -> Self {
        info!("Initializing Interpreter");

        let globals = Rc::new(RefCell::new(Environment::new()));

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::NativeFunction(Rc::new(NativeFunction::new("clock", 0, clock))),
        );

        Self {
            environment: globals.clone(),
            globals,
            locals: HashMap::new(),
            output: Box::new(io::stdout()),
            strict_unassigned: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            call_depth: 0,
        }
    }

    /// Sends `print` output to `output` instead of stdout.
    pub fn with_output(self, output: Box<dyn Write>) -> Self {
        Self { output, ..self }
    }

    /// When set, reading a variable declared without a value is an error
    /// instead of yielding `nil`.
    pub fn strict_unassigned(self, strict: bool) -> Self {
        Self {
            strict_unassigned: strict,
            ..self
        }
    }

    pub fn max_call_depth(self, max_call_depth: usize) -> Self {
        Self {
            max_call_depth,
            ..self
        }
    }

    pub fn globals(&self) -> &Rc<RefCell<Environment>> {
        &self.globals
    }

    /// Merges a resolver's binding table into the one in use.
    pub fn add_locals(&mut self, locals: Locals) {
        debug!("Adding {} resolved binding(s)", locals.len());

        self.locals.extend(locals);
    }

    /// Interprets a list of statements (a "program"). The first runtime error
    /// stops the run.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            if let Flow::Return(_) = self.execute(stmt)? {
                break;
            }
        }

        self.output.flush()?;

        info!("Interpretation completed successfully");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.output, "{}", value)?;
                debug!("Printed value: {}", value);
                Ok(Flow::Normal)
            }

            Stmt::Var { name, initializer } => {
                match initializer {
                    Some(expr) => {
                        let value = self.evaluate(expr)?;
                        debug!("Variable '{}' defined with value: {}", name.lexeme, value);
                        self.environment.borrow_mut().define(&name.lexeme, value);
                    }
                    None => {
                        debug!("Variable '{}' declared without a value", name.lexeme);
                        self.environment.borrow_mut().declare(&name.lexeme);
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Block(statements) => {
                let environment = Environment::child_of(&self.environment);
                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let flow @ Flow::Return(_) = self.execute(body)? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Function(declaration) => {
                let name = declaration.name().unwrap_or_default().to_string();
                debug!("Defining function '{}'", name);

                let function =
                    LoxFunction::new(declaration.clone(), self.environment.clone(), false);
                self.environment
                    .borrow_mut()
                    .define(&name, Value::Function(Rc::new(function)));
                Ok(Flow::Normal)
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                self.execute_class(name, superclass.as_ref(), methods)?;
                Ok(Flow::Normal)
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(e) => self.evaluate(e)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                Ok(Flow::Return(value))
            }
        }
    }

    /// Runs `statements` with `environment` as the current frame, restoring
    /// the previous frame afterwards whatever the outcome.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<Flow> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let result = self.execute_all(statements);

        self.environment = previous;
        result
    }

    fn execute_all(&mut self, statements: &[Stmt]) -> Result<Flow> {
        for stmt in statements {
            if let flow @ Flow::Return(_) = self.execute(stmt)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> Result<()> {
        debug!("Defining class '{}'", name.lexeme);

        let superclass: Option<Rc<LoxClass>> = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => name,
                    };
                    return Err(type_error(token, "Superclass must be a class."));
                }
            },
            None => None,
        };

        self.environment.borrow_mut().declare(&name.lexeme);

        // Methods of a subclass close over an extra frame holding `super`.
        let enclosing = self.environment.clone();
        if let Some(superclass) = &superclass {
            let environment = Environment::child_of(&enclosing);
            environment
                .borrow_mut()
                .define("super", Value::Class(superclass.clone()));
            self.environment = environment;
        }

        let methods: HashMap<String, Rc<LoxFunction>> = methods
            .iter()
            .map(|method| {
                let method_name = method.name().unwrap_or_default().to_string();
                let function = LoxFunction::new(
                    method.clone(),
                    self.environment.clone(),
                    method_name == "init",
                );
                (method_name, Rc::new(function))
            })
            .collect();

        let class = LoxClass::new(name.lexeme.clone(), superclass, methods);

        self.environment = enclosing;
        self.environment
            .borrow_mut()
            .assign(name, Value::Class(Rc::new(class)))?;

        info!("Class '{}' defined", name.lexeme);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(Value::from(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_val = self.evaluate(left)?;

                let decided = if operator.token_type == TokenType::OR {
                    left_val.is_truthy()
                } else {
                    !left_val.is_truthy()
                };

                if decided {
                    Ok(left_val)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable { id, name } => self.lookup_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&depth) => {
                        Environment::assign_at(&self.environment, depth, name, value.clone())?
                    }
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }

                debug!("Assigned value {} to '{}'", value, name.lexeme);
                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.evaluate(argument)?);
                }

                self.call_value(&callee, paren, args)
            }

            Expr::Function(declaration) => {
                let function =
                    LoxFunction::new(declaration.clone(), self.environment.clone(), false);
                Ok(Value::Function(Rc::new(function)))
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => instance.get(name),
                _ => Err(LoxError::runtime(
                    RuntimeErrorKind::NotInstance,
                    name,
                    "Only instances have properties.",
                )),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(LoxError::runtime(
                        RuntimeErrorKind::NotInstance,
                        name,
                        "Only instances have fields.",
                    ));
                };

                let value = self.evaluate(value)?;
                instance.set(name, value.clone());
                Ok(value)
            }

            Expr::This { id, keyword } => self.lookup_variable(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Result<Value> {
        let right_val = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => Ok(Value::Number(-number_operand(operator, &right_val)?)),
            TokenType::BANG => Ok(Value::Bool(!right_val.is_truthy())),
            _ => Err(type_error(operator, "Invalid unary operator.")),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value> {
        let left_val = self.evaluate(left)?;
        let right_val = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                _ => Err(type_error(
                    operator,
                    "Operands must be two numbers or two strings.",
                )),
            },

            TokenType::MINUS => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;
                Ok(Value::Number(a - b))
            }

            TokenType::STAR => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;
                Ok(Value::Number(a * b))
            }

            TokenType::SLASH => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;
                Ok(Value::Number(a / b))
            }

            TokenType::GREATER => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;
                Ok(Value::Bool(a > b))
            }

            TokenType::GREATER_EQUAL => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;
                Ok(Value::Bool(a >= b))
            }

            TokenType::LESS => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;
                Ok(Value::Bool(a < b))
            }

            TokenType::LESS_EQUAL => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;
                Ok(Value::Bool(a <= b))
            }

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left_val == right_val)),

            TokenType::BANG_EQUAL => Ok(Value::Bool(left_val != right_val)),

            _ => Err(type_error(operator, "Invalid binary operator.")),
        }
    }

    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value> {
        let depth = self.locals.get(&id).copied().ok_or_else(|| {
            LoxError::runtime(
                RuntimeErrorKind::UndefinedVariable,
                keyword,
                "Unresolved 'super'.",
            )
        })?;

        let superclass = match Environment::get_at(&self.environment, depth, keyword)? {
            Some(Value::Class(class)) => class,
            _ => return Err(type_error(keyword, "Superclass must be a class.")),
        };

        // `this` lives in the frame just inside the one holding `super`.
        let this_token = Token::synthetic(TokenType::THIS, "this", keyword);
        let this = Environment::get_at(&self.environment, depth.saturating_sub(1), &this_token)?;
        let instance = match this {
            Some(Value::Instance(instance)) => instance,
            _ => {
                return Err(LoxError::runtime(
                    RuntimeErrorKind::NotInstance,
                    keyword,
                    "Can't use 'super' without an instance.",
                ))
            }
        };

        let found = superclass.find_method(&method.lexeme).ok_or_else(|| {
            LoxError::runtime(
                RuntimeErrorKind::UndefinedProperty,
                method,
                format!("Undefined property '{}'.", method.lexeme),
            )
        })?;

        Ok(Value::Function(Rc::new(found.bind(instance))))
    }

    fn lookup_variable(&self, id: ExprId, name: &Token) -> Result<Value> {
        let slot: Slot = match self.locals.get(&id) {
            Some(&depth) => Environment::get_at(&self.environment, depth, name)?,
            None => self.globals.borrow().get(name)?,
        };

        match slot {
            Some(value) => Ok(value),
            None if self.strict_unassigned => Err(LoxError::runtime(
                RuntimeErrorKind::UndefinedVariable,
                name,
                format!("Attempted to access unassigned variable '{}'.", name.lexeme),
            )),
            None => Ok(Value::Nil),
        }
    }

    /// Checks callability, arity and depth, then invokes `callee`.
    fn call_value(&mut self, callee: &Value, paren: &Token, arguments: Vec<Value>) -> Result<Value> {
        debug!("Calling a {} with {} argument(s)", callee.type_name(), arguments.len());

        let Some(callable) = callee.as_callable() else {
            return Err(LoxError::runtime(
                RuntimeErrorKind::NotCallable,
                paren,
                "Can only call functions and classes.",
            ));
        };

        if arguments.len() != callable.arity() {
            return Err(LoxError::runtime(
                RuntimeErrorKind::Arity,
                paren,
                format!(
                    "Expected {} arguments but got {}.",
                    callable.arity(),
                    arguments.len()
                ),
            ));
        }

        if self.call_depth >= self.max_call_depth {
            return Err(LoxError::runtime(
                RuntimeErrorKind::StackOverflow,
                paren,
                "Stack overflow.",
            ));
        }

        self.call_depth += 1;
        let result = callable.call(self, paren, arguments);
        self.call_depth -= 1;

        result
    }
}
