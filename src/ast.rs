//! Syntax tree for Lox programs.
//!
//! Nodes are immutable once the parser builds them and each node owns its
//! children, so the tree is always a tree. Function declarations sit behind an
//! `Rc` because runtime function objects share them with the tree.
//!
//! Nodes that the resolver binds (variable reads, assignments, `this`,
//! `super`) carry an [`ExprId`]; the interpreter looks their depth up by that
//! id.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

use crate::token::Token;

/// Identity of a resolvable expression node.
///
/// Ids come from a process‑wide counter, so trees parsed at different times
/// (for instance successive prompt lines) never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExprId(usize);

impl ExprId {
    pub fn fresh() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);

        ExprId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A **literal constant** that appears directly in the source code.
///
/// These variants are the *terminal leaves* of the expression tree and
/// therefore do **not** retain the originating [`Token`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LiteralValue {
    /// Numeric literal ‑ stored as IEEE‑754 `f64`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    True,

    False,

    Nil,
}

/// Parameters and body shared by named functions, methods and anonymous
/// function expressions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    /// `None` for an anonymous `fun (...) { ... }` expression.
    pub name: Option<Token>,

    /// Parameter name tokens (arity ≤ 255).
    pub params: Vec<Token>,

    pub body: Vec<Stmt>,

    /// The `fun` keyword or the method name; used to position diagnostics.
    pub keyword: Token,
}

impl FunctionDecl {
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(|t| t.lexeme.as_str())
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Every kind of *expression* in Lox.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Prefix unary operator expression
    /// *Example:* `!isReady` or `-42`
    Unary {
        /// The operator token (`!` or `-`).
        operator: Token,
        right: Box<Expr>,
    },

    /// Infix binary operator expression
    /// *Example:* `a + b`, `x <= y`
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Short‑circuiting logical operators `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Parenthesised sub‑expression: `"(" expression ")"`.
    Grouping(Box<Expr>),

    /// Variable access.
    Variable { id: ExprId, name: Token },

    /// Assignment expression: `identifier "=" expression`
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },

    /// Function‑ or method‑call expression
    /// *Example:* `clock()` or `add(1, 2)`
    Call {
        callee: Box<Expr>,
        /// The closing `)` token ‑ retained for error reporting.
        paren: Token,
        arguments: Vec<Expr>,
    },

    /// Anonymous function: `fun (a, b) { ... }`.
    Function(Rc<FunctionDecl>),

    /// object.property
    Get { object: Box<Expr>, name: Token },

    /// object.property = value
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },

    /// The `this` keyword inside a method.
    This { id: ExprId, keyword: Token },

    /// `super.method`
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

/// Complete executable constructs. A program is a sequence of these.
///
/// There is no `for` statement: the parser lowers it to blocks and `while`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr),

    Print(Expr),

    /// Variable declaration: `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    /// Braced scope containing zero or more declarations/statements.
    Block(Vec<Stmt>),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    While {
        condition: Expr,
        body: Box<Stmt>,
    },

    /// Named function declaration. Always has `name`.
    Function(Rc<FunctionDecl>),

    Class {
        name: Token,
        /// Always an [`Expr::Variable`] when present.
        superclass: Option<Expr>,
        methods: Vec<Rc<FunctionDecl>>,
    },

    Return {
        /// The `return` keyword token (for error locations).
        keyword: Token,

        /// Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },
}
