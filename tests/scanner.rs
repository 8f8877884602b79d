#[cfg(test)]
mod scanner_tests {
    use treelox as lox;

    use lox::error::LoxError;
    use lox::scanner::*;
    use lox::token::*;

    fn assert_token_sequence(source: &str, expected: &[(TokenType, &str)]) {
        let scanner = Scanner::new(source.as_bytes());
        let tokens: Vec<_> = scanner.filter_map(Result::ok).collect();

        assert_eq!(tokens.len(), expected.len());

        for (actual, (expected_type, expected_lexeme)) in tokens.iter().zip(expected.iter()) {
            assert_eq!(actual.token_type, *expected_type);
            assert_eq!(actual.lexeme, *expected_lexeme);
        }
    }

    fn assert_token_matches(
        result: &Result<Token, LoxError>,
        expected_type: TokenType,
        expected_lexeme: &str,
    ) {
        match result {
            Ok(token) => {
                assert_eq!(
                    token.token_type, expected_type,
                    "Expected token type {:?}, got {:?}",
                    expected_type, token.token_type
                );
                assert_eq!(
                    token.lexeme, expected_lexeme,
                    "Expected lexeme '{}', got '{}'",
                    expected_lexeme, token.lexeme
                );
            }
            Err(e) => panic!("Expected token but got error: {}", e),
        }
    }

    #[test]
    fn test_scanner_01_symbols() {
        assert_token_sequence(
            "({*.,+*})",
            &[
                (TokenType::LEFT_PAREN, "("),
                (TokenType::LEFT_BRACE, "{"),
                (TokenType::STAR, "*"),
                (TokenType::DOT, "."),
                (TokenType::COMMA, ","),
                (TokenType::PLUS, "+"),
                (TokenType::STAR, "*"),
                (TokenType::RIGHT_BRACE, "}"),
                (TokenType::RIGHT_PAREN, ")"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_02_operators_and_comments() {
        assert_token_sequence(
            "!= == <= >= ! = < > / // the rest is ignored",
            &[
                (TokenType::BANG_EQUAL, "!="),
                (TokenType::EQUAL_EQUAL, "=="),
                (TokenType::LESS_EQUAL, "<="),
                (TokenType::GREATER_EQUAL, ">="),
                (TokenType::BANG, "!"),
                (TokenType::EQUAL, "="),
                (TokenType::LESS, "<"),
                (TokenType::GREATER, ">"),
                (TokenType::SLASH, "/"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_03_keywords_and_identifiers() {
        assert_token_sequence(
            "class Foo < Bar { init() { this.x = super.y; } } fun_ var",
            &[
                (TokenType::CLASS, "class"),
                (TokenType::IDENTIFIER, "Foo"),
                (TokenType::LESS, "<"),
                (TokenType::IDENTIFIER, "Bar"),
                (TokenType::LEFT_BRACE, "{"),
                (TokenType::IDENTIFIER, "init"),
                (TokenType::LEFT_PAREN, "("),
                (TokenType::RIGHT_PAREN, ")"),
                (TokenType::LEFT_BRACE, "{"),
                (TokenType::THIS, "this"),
                (TokenType::DOT, "."),
                (TokenType::IDENTIFIER, "x"),
                (TokenType::EQUAL, "="),
                (TokenType::SUPER, "super"),
                (TokenType::DOT, "."),
                (TokenType::IDENTIFIER, "y"),
                (TokenType::SEMICOLON, ";"),
                (TokenType::RIGHT_BRACE, "}"),
                (TokenType::RIGHT_BRACE, "}"),
                (TokenType::IDENTIFIER, "fun_"),
                (TokenType::VAR, "var"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_04_literals() {
        let tokens: Vec<Token> = Scanner::new(b"12 3.25 \"hi there\" 7.")
            .filter_map(Result::ok)
            .collect();

        assert!(matches!(tokens[0].token_type, TokenType::NUMBER(n) if n == 12.0));
        assert!(matches!(tokens[1].token_type, TokenType::NUMBER(n) if n == 3.25));
        assert!(matches!(&tokens[2].token_type, TokenType::STRING(s) if s == "hi there"));
        // A trailing dot is not part of the number.
        assert!(matches!(tokens[3].token_type, TokenType::NUMBER(n) if n == 7.0));
        assert_eq!(tokens[4].token_type, TokenType::DOT);
    }

    #[test]
    fn test_scanner_05_display() {
        let lines: Vec<String> = Scanner::new(b"var x = 42; \"s\" 1.5")
            .filter_map(Result::ok)
            .map(|t| t.to_string())
            .collect();

        assert_eq!(
            lines,
            vec![
                "VAR var null",
                "IDENTIFIER x null",
                "EQUAL = null",
                "NUMBER 42 42.0",
                "SEMICOLON ; null",
                "STRING \"s\" s",
                "NUMBER 1.5 1.5",
                "EOF  null",
            ]
        );
    }

    #[test]
    fn test_scanner_06_positions() {
        let tokens: Vec<Token> = Scanner::new(b"a\n  bc \"x\ny\" d")
            .filter_map(Result::ok)
            .collect();

        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
        // A string starts where its opening quote is.
        assert_eq!((tokens[2].line, tokens[2].column), (2, 6));
        // Lines inside a string still count.
        assert_eq!(tokens[3].line, 3);
        assert_eq!(tokens[4].token_type, TokenType::EOF);
    }

    #[test]
    fn test_unexpected_chars_token_sequence() {
        let source = ",.$(#";
        let results: Vec<_> = Scanner::new(source.as_bytes()).collect();

        // 0: COMMA ','
        // 1: DOT '.'
        // 2: Error for '$'
        // 3: LEFT_PAREN '('
        // 4: Error for '#'
        // 5: EOF
        assert_eq!(results.len(), 6, "Expected 6 items in result");

        assert_token_matches(&results[0], TokenType::COMMA, ",");
        assert_token_matches(&results[1], TokenType::DOT, ".");
        assert_token_matches(&results[3], TokenType::LEFT_PAREN, "(");
        assert_token_matches(&results[5], TokenType::EOF, "");

        let errors: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .map(|e| e.to_string())
            .collect();

        assert_eq!(
            errors,
            vec![
                "[line 1] Error: Unexpected character: $",
                "[line 1] Error: Unexpected character: #",
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let (tokens, errors) = scan_all(b"print \"never closed\n;");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "[line 1] Error: Unterminated string.");
        assert!(errors[0].is_static());
        assert_eq!(errors[0].exit_code(), 65);

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].token_type, TokenType::EOF);
    }

    #[test]
    fn test_exactly_one_eof() {
        let mut scanner = Scanner::new(b"");

        assert_token_matches(&scanner.next().unwrap(), TokenType::EOF, "");
        assert!(scanner.next().is_none());
        assert!(scanner.next().is_none());
    }
}
