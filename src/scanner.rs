//! Module `scanner` implements a one‑pass, streaming lexer for Lox.
//!
//! It transforms a byte slice (`&[u8]`) into a sequence of [`Token`]s, skipping
//! whitespace and comments, and emitting exactly one `EOF` token at the end.
//! It is a `FusedIterator`, so it chains safely with other iterator adapters.
//!
//! # Public API
//!
//! - `Scanner::new(src: &[u8]) -> Scanner<'_>`
//!   Create a new lexer over the input buffer.
//!
//! - `impl Iterator for Scanner<'_>`
//!   Yields `Result<Token, LoxError>` on each `.next()`. A lexing error does not
//!   stop the stream; the next call resumes after the offending byte.
//!
//! # Positions
//!
//! Every token records the line and column of its *first* byte. Lines are
//! 1‑based and advance on `\n` (also inside multi‑line strings); columns are
//! 1‑based byte offsets from the start of the line.
//!
//! # Example
//!
//! ```rust
//! use treelox::scanner::Scanner;
//!
//! let source = b"print 123; // example";
//! for result in Scanner::new(source) {
//!     match result {
//!         Ok(token) => println!("{}", token),
//!         Err(err) => eprintln!("Lex error: {}", err),
//!     }
//! }
//! ```

use crate::error::{LoxError, Result};
use crate::token::{Token, TokenType};
use log::{debug, info};
use memchr::memchr;
use phf::phf_map;
use std::iter::FusedIterator;

// ─────────────────────────────────────────────────────────────────────────────
// Static keyword map (compile‑time perfect hash)
// ─────────────────────────────────────────────────────────────────────────────

static KEYWORDS: phf::Map<&'static [u8], TokenType> = phf_map! {
    b"and"    => TokenType::AND,
    b"class"  => TokenType::CLASS,
    b"else"   => TokenType::ELSE,
    b"false"  => TokenType::FALSE,
    b"fun"    => TokenType::FUN,
    b"for"    => TokenType::FOR,
    b"if"     => TokenType::IF,
    b"nil"    => TokenType::NIL,
    b"or"     => TokenType::OR,
    b"print"  => TokenType::PRINT,
    b"return" => TokenType::RETURN,
    b"super"  => TokenType::SUPER,
    b"this"   => TokenType::THIS,
    b"true"   => TokenType::TRUE,
    b"var"    => TokenType::VAR,
    b"while"  => TokenType::WHILE,
};

/// A single pass **scanner / lexer** that converts raw UTF‑8 bytes into a
/// sequence of [`Token`]s.
pub struct Scanner<'a> {
    src: &'a [u8],              // entire source file
    start: usize,               // index of the *first* byte of the current lexeme
    curr: usize,                // index *one past* the last byte examined
    line: usize,                // 1‑based line counter (\n increments)
    line_start: usize,          // index of the first byte of the current line
    token_line: usize,          // line where the current lexeme began
    token_column: usize,        // column where the current lexeme began
    pending: Option<TokenType>, // recognised token kind waiting to be emitted
}

impl<'a> Scanner<'a> {
    /// Create a new lexer over `src`.
    #[inline]
    pub fn new(src: &'a [u8]) -> Self {
        info!("Scanner created over {} bytes", src.len());

        Self {
            src,
            start: 0,
            curr: 0,
            line: 1,
            line_start: 0,
            token_line: 1,
            token_column: 1,
            pending: None,
        }
    }

    // ───────────────────────────── primitive helpers ────────────────────────

    #[inline(always)]
    const fn len(&self) -> usize {
        self.src.len()
    }

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        self.curr >= self.len()
    }

    /// Advance one byte and return it.  Callers guard with [`Self::is_at_end`].
    #[inline(always)]
    fn advance(&mut self) -> u8 {
        let b = self.src[self.curr];
        self.curr += 1;
        b
    }

    /// Peek at the current byte without consuming it.  Returns `0` past EOF.
    #[inline(always)]
    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.src[self.curr]
        }
    }

    #[inline(always)]
    fn peek_next(&self) -> u8 {
        if self.curr + 1 >= self.len() {
            0
        } else {
            self.src[self.curr + 1]
        }
    }

    /// Conditionally consume a byte **iff** it matches `expected`.
    #[inline(always)]
    fn match_byte(&mut self, expected: u8) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Record that the byte just consumed was a newline.
    #[inline(always)]
    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.curr;
    }

    fn lexeme(&self) -> String {
        String::from_utf8_lossy(&self.src[self.start..self.curr]).into_owned()
    }

    // ───────────────────────────── core lexing ─────────────────────────────

    /// Consume `next` if it follows, choosing between a two‑byte operator and
    /// its one‑byte prefix.
    #[inline(always)]
    fn either(&mut self, next: u8, matched: TokenType, single: TokenType) -> TokenType {
        if self.match_byte(next) {
            matched
        } else {
            single
        }
    }

    /// Scan one lexeme starting at `self.curr` and store its kind in
    /// `self.pending`. Whitespace and comments leave `pending` empty.
    fn scan_token(&mut self) -> Result<()> {
        let b = self.advance();

        let tt = match b {
            b'(' => TokenType::LEFT_PAREN,
            b')' => TokenType::RIGHT_PAREN,
            b'{' => TokenType::LEFT_BRACE,
            b'}' => TokenType::RIGHT_BRACE,
            b',' => TokenType::COMMA,
            b'.' => TokenType::DOT,
            b'-' => TokenType::MINUS,
            b'+' => TokenType::PLUS,
            b';' => TokenType::SEMICOLON,
            b'*' => TokenType::STAR,

            b'!' => self.either(b'=', TokenType::BANG_EQUAL, TokenType::BANG),
            b'=' => self.either(b'=', TokenType::EQUAL_EQUAL, TokenType::EQUAL),
            b'<' => self.either(b'=', TokenType::LESS_EQUAL, TokenType::LESS),
            b'>' => self.either(b'=', TokenType::GREATER_EQUAL, TokenType::GREATER),

            b' ' | b'\r' | b'\t' => return Ok(()),

            b'\n' => {
                self.newline();
                return Ok(());
            }

            b'/' if self.match_byte(b'/') => {
                // Stop *before* the newline so the arm above counts it.
                self.curr = match memchr(b'\n', &self.src[self.curr..]) {
                    Some(pos) => self.curr + pos,
                    None => self.len(),
                };
                return Ok(());
            }

            b'/' => TokenType::SLASH,

            b'"' => self.string()?,

            b'0'..=b'9' => self.number(),

            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.identifier(),

            _ => {
                return Err(LoxError::lex(
                    self.token_line,
                    self.token_column,
                    format!("Unexpected character: {}", b as char),
                ));
            }
        };

        self.pending = Some(tt);
        Ok(())
    }

    /// Rest of a string literal after its opening quote. Strings may span
    /// lines; there are no escapes.
    fn string(&mut self) -> Result<TokenType> {
        while !self.is_at_end() && self.peek() != b'"' {
            if self.advance() == b'\n' {
                self.newline();
            }
        }

        if self.is_at_end() {
            return Err(LoxError::lex(
                self.token_line,
                self.token_column,
                "Unterminated string.",
            ));
        }

        self.advance(); // closing quote

        let contents = &self.src[self.start + 1..self.curr - 1];
        Ok(TokenType::STRING(
            String::from_utf8_lossy(contents).into_owned(),
        ))
    }

    /// Digits with an optional fraction. A trailing `.` is left for `DOT`.
    fn number(&mut self) -> TokenType {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        // Only ASCII digits and at most one '.' were consumed.
        TokenType::NUMBER(self.lexeme().parse::<f64>().unwrap_or(0.0))
    }

    /// An identifier, or a keyword if the perfect‑hash map knows it.
    fn identifier(&mut self) -> TokenType {
        while matches!(self.peek(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.advance();
        }

        KEYWORDS
            .get(&self.src[self.start..self.curr])
            .cloned()
            .unwrap_or(TokenType::IDENTIFIER)
    }
}

// ───────────────────────── Iterator implementation ─────────────────────────

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        // Loop until we either emit a token, hit EOF, or see an error.
        while self.curr <= self.len() {
            // 1. EOF guard – emit exactly one EOF then terminate.
            if self.curr == self.len() {
                self.curr += 1;
                let column = self.len() - self.line_start + 1;
                return Some(Ok(Token::new(TokenType::EOF, "", self.line, column)));
            }

            // 2. Reset per‑token state.
            self.start = self.curr;
            self.token_line = self.line;
            self.token_column = self.start - self.line_start + 1;
            self.pending = None;

            // 3. Attempt to scan a token.
            if let Err(e) = self.scan_token() {
                return Some(Err(e));
            }

            // 4. If a real token was recognised, build and return it.
            if let Some(tt) = self.pending.take() {
                debug!("Scanned token ({:?}) on line {}", tt, self.token_line);

                return Some(Ok(Token::new(
                    tt,
                    self.lexeme(),
                    self.token_line,
                    self.token_column,
                )));
            }
        }

        None // already yielded EOF
    }
}

impl<'a> FusedIterator for Scanner<'a> {}

/// Scan all of `src`, splitting the stream into tokens and lexing errors.
pub fn scan_all(src: &[u8]) -> (Vec<Token>, Vec<LoxError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for item in Scanner::new(src) {
        match item {
            Ok(token) => tokens.push(token),
            Err(e) => errors.push(e),
        }
    }

    info!(
        "Scanned {} token(s) with {} error(s)",
        tokens.len(),
        errors.len()
    );

    (tokens, errors)
}
