//! Centralised error hierarchy for the interpreter.
//!
//! Every subsystem (scanner, parser, resolver, runtime, CLI) converts its
//! failure modes into one of the variants defined here, so the whole crate
//! shares a single `Result<T>` alias and interoperates with `anyhow` in the
//! binary while keeping the source position of each diagnostic.
//!
//! The module **does not** print diagnostics itself.

use std::io;
use thiserror::Error;

use log::info;

use crate::token::{Token, TokenType};

/// What went wrong while evaluating a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Operand(s) of the wrong type for an operator.
    Type,

    /// Read or assignment of a name no frame defines.
    UndefinedVariable,

    /// Property missing from both the instance fields and the class chain.
    UndefinedProperty,

    /// Argument count does not match the callee's arity.
    Arity,

    /// Call on a value that is neither a function nor a class.
    NotCallable,

    /// Property access on something that is not an instance.
    NotInstance,

    /// Call depth limit exceeded.
    StackOverflow,

    /// Failure reported by a host-implemented function.
    Native,
}

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source position.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,

        /// 1‑based column of the offending byte.
        column: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
        /// ` at 'lexeme'` or ` at end`.
        location: String,
    },

    /// Static‑analysis failure reported by the resolver.
    #[error("[line {line}] Error{location}: {message}")]
    Resolve {
        message: String,
        line: usize,
        column: usize,
        location: String,
    },

    /// Runtime evaluation error.
    #[error("{message}\n[line {line}]")]
    Runtime {
        kind: RuntimeErrorKind,
        message: String,
        line: usize,
        column: usize,
    },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Renders the `at ...` part of a diagnostic for `token`.
fn location_of(token: &Token) -> String {
    if token.token_type == TokenType::EOF {
        " at end".to_string()
    } else {
        format!(" at '{}'", token.lexeme)
    }
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, column: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex {
            message,
            line,
            column,
        }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", token.line, message);

        LoxError::Parse {
            message,
            line: token.line,
            column: token.column,
            location: location_of(token),
        }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", token.line, message);

        LoxError::Resolve {
            message,
            line: token.line,
            column: token.column,
            location: location_of(token),
        }
    }

    /// Helper constructor for the **interpreter**.
    pub fn runtime<S: Into<String>>(kind: RuntimeErrorKind, token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!(
            "Creating Runtime error: kind={:?}, line={}, msg={}",
            kind, token.line, message
        );

        LoxError::Runtime {
            kind,
            message,
            line: token.line,
            column: token.column,
        }
    }

    /// The runtime error kind, if this is a runtime error.
    pub fn runtime_kind(&self) -> Option<RuntimeErrorKind> {
        match self {
            LoxError::Runtime { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// `true` for errors found before any code ran.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve { .. }
        )
    }

    /// Process exit status the CLI uses for this error (sysexits style).
    pub fn exit_code(&self) -> i32 {
        match self {
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve { .. } => 65,
            LoxError::Runtime { .. } => 70,
            LoxError::Io(_) => 74,
        }
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;
