//! Lexer (tokenizer) for the netlist language.

use crate::error::{Result, SymnaError};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The token's text (braces stripped for expressions)
    pub text: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types in the netlist language.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// An identifier (designator, node name, model keyword, symbol)
    Identifier,
    /// A number, possibly with a unit suffix
    Number,
    /// A braced expression `{...}`
    Expression,
    /// A directive (starts with '.')
    Directive,
    /// Equals sign '='
    Equals,
    /// Newline
    Newline,
    /// End of file
    Eof,
}

/// Lexer for tokenizing netlist input.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let line = self.line;
        let column = self.column;
        let token = |kind, text: String| Token {
            kind,
            text,
            line,
            column,
        };

        let ch = match self.chars.peek().copied() {
            Some(ch) => ch,
            None => return Ok(token(TokenKind::Eof, String::new())),
        };

        let token = match ch {
            '\n' => {
                self.advance();
                token(TokenKind::Newline, "\n".to_string())
            }
            '.' => {
                self.advance();
                let text = self.read_identifier();
                token(TokenKind::Directive, format!(".{}", text))
            }
            '=' => {
                self.advance();
                token(TokenKind::Equals, "=".to_string())
            }
            '{' => {
                self.advance();
                let text = self.read_braced(line, column)?;
                token(TokenKind::Expression, text)
            }
            '-' | '+' | '0'..='9' => token(TokenKind::Number, self.read_number()),
            _ if ch.is_alphabetic() || ch == '_' => token(TokenKind::Identifier, self.read_identifier()),
            _ => {
                return Err(SymnaError::lexer(
                    line,
                    column,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };

        Ok(token)
    }

    /// Consume the raw remainder of the current line (used by `.title`).
    pub fn rest_of_line(&mut self) -> String {
        let mut text = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch == '\n' {
                break;
            }
            text.push(ch);
            self.advance();
        }
        text.trim().to_string()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&ch) = self.chars.peek() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else if ch == '#' || ch == ';' || (ch == '*' && self.column == 1) {
                self.skip_line();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut text = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    fn read_braced(&mut self, line: usize, column: usize) -> Result<String> {
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            match self.chars.peek().copied() {
                Some('}') if depth == 0 => {
                    self.advance();
                    return Ok(text.trim().to_string());
                }
                Some('\n') | None => {
                    return Err(SymnaError::lexer(line, column, "unterminated '{' expression"));
                }
                Some(ch) => {
                    match ch {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    text.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> String {
        let mut text = String::new();

        if let Some(&ch) = self.chars.peek() {
            if ch == '-' || ch == '+' {
                text.push(ch);
                self.advance();
            }
        }

        self.read_digits(&mut text);

        if let Some(&'.') = self.chars.peek() {
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }

        // Exponent, only when followed by a digit or sign ("1e3", not "1meg")
        if let Some(&ch) = self.chars.peek() {
            if ch == 'e' || ch == 'E' {
                let mut lookahead = self.chars.clone();
                lookahead.next();
                if matches!(lookahead.peek(), Some(c) if c.is_ascii_digit() || *c == '-' || *c == '+') {
                    text.push(ch);
                    self.advance();
                    if let Some(&sign) = self.chars.peek() {
                        if sign == '-' || sign == '+' {
                            text.push(sign);
                            self.advance();
                        }
                    }
                    self.read_digits(&mut text);
                }
            }
        }

        // Unit suffix and any trailing unit letters ("10k", "1meg", "100nF")
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == 'µ' || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenKind, String)> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push((tok.kind, tok.text));
        }
        out
    }

    #[test]
    fn test_lexer_basic() {
        let toks = kinds("R1 in out 10k");
        assert_eq!(toks[0], (TokenKind::Identifier, "R1".to_string()));
        assert_eq!(toks[1], (TokenKind::Identifier, "in".to_string()));
        assert_eq!(toks[3], (TokenKind::Number, "10k".to_string()));
    }

    #[test]
    fn test_lexer_numbers_and_expressions() {
        let toks = kinds("C1 1 0 1e-9 dcvar={(0.01*C)^2} 1meg");
        assert_eq!(toks[1], (TokenKind::Number, "1".to_string()));
        assert_eq!(toks[3], (TokenKind::Number, "1e-9".to_string()));
        assert_eq!(toks[5].0, TokenKind::Equals);
        assert_eq!(toks[6], (TokenKind::Expression, "(0.01*C)^2".to_string()));
        assert_eq!(toks[7], (TokenKind::Number, "1meg".to_string()));
    }

    #[test]
    fn test_lexer_comments_and_directives() {
        let toks = kinds("* title comment\n.param a=2 ; trailing\nR1 a 0 # more");
        assert_eq!(toks[0].0, TokenKind::Newline);
        assert_eq!(toks[1], (TokenKind::Directive, ".param".to_string()));
        assert_eq!(toks[5].0, TokenKind::Newline);
        assert_eq!(toks.len(), 9);
    }

    #[test]
    fn test_lexer_unterminated_brace() {
        let mut lexer = Lexer::new("R1 1 0 {R*2\n");
        for _ in 0..3 {
            lexer.next_token().unwrap();
        }
        assert!(matches!(
            lexer.next_token(),
            Err(SymnaError::LexerError { line: 1, column: 8, .. })
        ));
    }
}
