use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use treelox as lox;

use lox::ast::Stmt;
use lox::ast_printer::AstPrinter;
use lox::interpreter::{Interpreter, DEFAULT_MAX_CALL_DEPTH, EVALUATOR_STACK_SIZE};
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner::{scan_all, Scanner};
use lox::LoxError;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,

    /// Make reading a variable that was declared without a value an error
    #[arg(long, global = true)]
    strict_unassigned: bool,

    /// Maximum depth of nested calls before a stack overflow is reported
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize { filename: PathBuf },

    /// Parses input from a file as a program and prints its AST
    Parse {
        filename: PathBuf,

        /// Print the syntax tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs input from a file as a Lox program, or starts a prompt without one
    Run { filename: Option<PathBuf> },
}

/// Maps the file into memory and copies it out.
fn read_file(filename: &Path) -> Result<Vec<u8>> {
    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;

    let len = file
        .metadata()
        .context(format!("Failed to stat file {:?}", filename))?
        .len();

    // Mapping an empty file fails on some platforms.
    if len == 0 {
        return Ok(Vec::new());
    }

    // SAFETY: the map is only read for the duration of this copy.
    let map = unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;
    let buf = map.to_vec();

    info!("Read {} bytes from {:?}", buf.len(), filename);

    Ok(buf)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            // Strip 'treelox::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("treelox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "{} [{}:{}] - {}",
                Local::now().format("%H:%M:%S%.3f"),
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Prints every error and exits with the status of the first.
fn fail(errors: &[LoxError]) -> ! {
    for e in errors {
        debug!("Reporting error: {:?}", e);
        eprintln!("{}", e);
    }

    let code = errors.first().map_or(65, LoxError::exit_code);
    std::process::exit(code);
}

fn tokenize(filename: &Path) -> Result<()> {
    info!("Running Tokenize subcommand");
    let buf = read_file(filename)?;
    let mut tokenized = true;

    for token in Scanner::new(&buf) {
        match token {
            Ok(token) => println!("{}", token),
            Err(e) => {
                tokenized = false;
                eprintln!("{}", e);
            }
        }
    }

    if !tokenized {
        debug!("Tokenization failed, exiting with code 65");
        std::process::exit(65);
    }

    info!("Tokenization completed successfully");
    Ok(())
}

fn parse(filename: &Path, json: bool) -> Result<()> {
    info!("Running Parse subcommand");
    let buf = read_file(filename)?;

    let (tokens, lex_errors) = scan_all(&buf);
    let parsed = Parser::new(&tokens).parse();

    let statements = match parsed {
        Ok(statements) if lex_errors.is_empty() => statements,
        Ok(_) => fail(&lex_errors),
        Err(parse_errors) => {
            let errors: Vec<LoxError> = lex_errors.into_iter().chain(parse_errors).collect();
            fail(&errors)
        }
    };

    if json {
        let out = serde_json::to_string_pretty(&statements).context("Failed to serialize AST")?;
        println!("{}", out);
    } else {
        println!("{}", AstPrinter::print_program(&statements));
    }

    info!("Parse subcommand completed");
    Ok(())
}

fn evaluate(filename: &Path, mut interpreter: Interpreter) -> Result<()> {
    info!("Running Evaluate subcommand");
    let buf = read_file(filename)?;

    let (tokens, lex_errors) = scan_all(&buf);
    if !lex_errors.is_empty() {
        fail(&lex_errors);
    }

    let expr = match Parser::new(&tokens).parse_expression() {
        Ok(expr) => expr,
        Err(e) => fail(&[e]),
    };

    // Function expressions inside may still bind locals.
    match Resolver::new().resolve(&[Stmt::Expression(expr.clone())]) {
        Ok(locals) => interpreter.add_locals(locals),
        Err(errors) => fail(&errors),
    }

    match interpreter.evaluate(&expr) {
        Ok(value) => {
            debug!("Evaluated to: {}", value);
            println!("{}", value);
        }
        Err(e) => fail(&[e]),
    }

    info!("Evaluate subcommand completed");
    Ok(())
}

fn run_file(filename: &Path, mut interpreter: Interpreter) -> Result<()> {
    info!("Running Run subcommand");
    let buf = read_file(filename)?;

    info!("Provided input:\n {}", String::from_utf8_lossy(&buf));

    if let Err(errors) = lox::run(&mut interpreter, &buf) {
        fail(&errors);
    }

    info!("Program executed successfully");
    Ok(())
}

/// Reads and runs one line at a time. Globals survive between lines and
/// errors are reported without leaving the prompt.
fn run_prompt(mut interpreter: Interpreter) -> Result<()> {
    info!("Starting prompt");
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush prompt")?;

        line.clear();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;

        if read == 0 {
            println!();
            break;
        }

        if let Err(errors) = lox::run(&mut interpreter, line.as_bytes()) {
            for e in errors {
                eprintln!("{}", e);
            }
        }
    }

    info!("Prompt closed");
    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    // Deep Lox recursion needs far more host stack than the main thread has.
    let evaluator = std::thread::Builder::new()
        .name("evaluator".into())
        .stack_size(EVALUATOR_STACK_SIZE)
        .spawn(move || dispatch(args))
        .context("Failed to start evaluator thread")?;

    evaluator
        .join()
        .map_err(|_| anyhow!("Evaluator thread panicked"))?
}

fn dispatch(args: Cli) -> Result<()> {
    let interpreter = Interpreter::new()
        .strict_unassigned(args.strict_unassigned)
        .max_call_depth(args.max_call_depth);

    match args.commands {
        Commands::Tokenize { filename } => tokenize(&filename),
        Commands::Parse { filename, json } => parse(&filename, json),
        Commands::Evaluate { filename } => evaluate(&filename, interpreter),
        Commands::Run {
            filename: Some(filename),
        } => run_file(&filename, interpreter),
        Commands::Run { filename: None } => run_prompt(interpreter),
    }
}
