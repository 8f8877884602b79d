//! `treelox`: a tree‑walking interpreter for the Lox language.
//!
//! Source goes through four stages: [`scanner`] → [`parser`] →
//! [`resolver`] → [`interpreter`]. [`run`] drives all of them.
//!
//! ```
//! use treelox::interpreter::Interpreter;
//! use treelox::output::CaptureOutput;
//!
//! let out = CaptureOutput::new();
//! let mut interpreter = Interpreter::new().with_output(Box::new(out.clone()));
//!
//! treelox::run(&mut interpreter, b"print 1 + 2;").unwrap();
//! assert_eq!(out.contents(), "3\n");
//! ```

pub mod ast;
pub mod ast_printer;
pub mod class;
pub mod environment;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod output;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod token;
pub mod value;

use log::info;

pub use error::{LoxError, Result};

use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;

/// Scans, parses, resolves and interprets `source` with `interpreter`.
///
/// Static errors (lexing, parsing, resolution) are all collected and stop the
/// program before it starts. A runtime error stops it where it happens.
/// Interpreter state persists across calls, which is what the prompt relies
/// on.
pub fn run(interpreter: &mut Interpreter, source: &[u8]) -> std::result::Result<(), Vec<LoxError>> {
    let (tokens, mut errors) = scanner::scan_all(source);

    let statements = match Parser::new(&tokens).parse() {
        Ok(statements) => statements,
        Err(parse_errors) => {
            errors.extend(parse_errors);
            return Err(errors);
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    let locals = Resolver::new().resolve(&statements)?;
    interpreter.add_locals(locals);

    info!("Static checks passed, running {} statement(s)", statements.len());

    interpreter.interpret(&statements).map_err(|e| vec![e])
}
