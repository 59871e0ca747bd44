//! C Lexer - tokenizes source code

use thiserror::Error;

use crate::token::{Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

#[derive(Debug, Error)]
#[error("lex error at line {line}, col {col}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.advance();
            } else if ch == b'/' && self.peek_next() == Some(b'/') {
                // Line comment
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch == b'/' && self.peek_next() == Some(b'*') {
                // Block comment
                self.advance(); // /
                self.advance(); // *
                while let Some(c) = self.peek() {
                    if c == b'*' && self.peek_next() == Some(b'/') {
                        self.advance(); // *
                        self.advance(); // /
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> TokenKind {
        let mut value: i64 = 0;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                value = value * 10 + (ch - b'0') as i64;
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::IntLit(value)
    }

    fn read_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let name = String::from_utf8_lossy(&self.input[start..self.pos]).to_string();

        // Check for keywords
        match name.as_str() {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "return" => TokenKind::Return,
            "int" => TokenKind::Int,
            "char" => TokenKind::Char,
            "void" => TokenKind::Void,
            "const" => TokenKind::Const,
            _ => TokenKind::Ident(name),
        }
    }

    /// Decode one byte after a backslash. Any escaped character outside
    /// the recognized set (including the enclosing quote) is taken
    /// verbatim.
    fn read_escape(&mut self, context: &str) -> Result<u8, LexError> {
        match self.peek() {
            Some(b'n') => {
                self.advance();
                Ok(b'\n')
            }
            Some(b'r') => {
                self.advance();
                Ok(b'\r')
            }
            Some(b't') => {
                self.advance();
                Ok(b'\t')
            }
            Some(b'0') => {
                self.advance();
                Ok(0)
            }
            Some(b'\\') => {
                self.advance();
                Ok(b'\\')
            }
            Some(c) => {
                self.advance();
                Ok(c)
            }
            None => Err(self.error(&format!("unexpected end of input in {context}"))),
        }
    }

    fn read_char(&mut self) -> Result<TokenKind, LexError> {
        self.advance(); // opening '
        let ch = match self.peek() {
            Some(b'\\') => {
                self.advance();
                self.read_escape("char literal")?
            }
            Some(c) => {
                self.advance();
                c
            }
            None => return Err(self.error("unexpected end of input in char literal")),
        };
        if self.peek() != Some(b'\'') {
            return Err(self.error("expected closing quote in char literal"));
        }
        self.advance(); // closing '

        // Char literals carry no distinct tag; the byte's code point is the value
        Ok(TokenKind::IntLit(ch as i64))
    }

    fn read_string(&mut self) -> Result<TokenKind, LexError> {
        self.advance(); // opening "
        let mut s = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    s.push(self.read_escape("string literal")?);
                }
                Some(c) => {
                    self.advance();
                    s.push(c);
                }
                None => return Err(self.error("unterminated string literal")),
            }
        }
        Ok(TokenKind::StringLit(s))
    }

    fn error(&self, message: &str) -> LexError {
        LexError {
            message: message.to_string(),
            line: self.line,
            col: self.col,
        }
    }

    fn next_kind(&mut self) -> Result<TokenKind, LexError> {
        let ch = match self.peek() {
            Some(c) => c,
            None => return Ok(TokenKind::Eof),
        };

        // Numbers
        if ch.is_ascii_digit() {
            return Ok(self.read_number());
        }

        // Identifiers and keywords
        if ch.is_ascii_alphabetic() || ch == b'_' {
            return Ok(self.read_ident());
        }

        // Character literal
        if ch == b'\'' {
            return self.read_char();
        }

        // String literal
        if ch == b'"' {
            return self.read_string();
        }

        // Operators and delimiters; two-character operators win over
        // one-character prefixes
        self.advance();
        match ch {
            b'+' => Ok(TokenKind::Plus),
            b'-' => Ok(TokenKind::Minus),
            b'*' => Ok(TokenKind::Star),
            b'/' => Ok(TokenKind::Slash),
            b'%' => Ok(TokenKind::Percent),
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.advance();
                    Ok(TokenKind::AmpAmp)
                } else {
                    Ok(TokenKind::Amp)
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.advance();
                    Ok(TokenKind::PipePipe)
                } else {
                    // The language has no bitwise-or
                    Err(self.error("unexpected character: '|'"))
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Ok(TokenKind::BangEq)
                } else {
                    Ok(TokenKind::Bang)
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Ok(TokenKind::LtEq)
                } else {
                    Ok(TokenKind::Lt)
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Ok(TokenKind::GtEq)
                } else {
                    Ok(TokenKind::Gt)
                }
            }
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Ok(TokenKind::EqEq)
                } else {
                    Ok(TokenKind::Eq)
                }
            }
            b'(' => Ok(TokenKind::LParen),
            b')' => Ok(TokenKind::RParen),
            b'{' => Ok(TokenKind::LBrace),
            b'}' => Ok(TokenKind::RBrace),
            b'[' => Ok(TokenKind::LBracket),
            b']' => Ok(TokenKind::RBracket),
            b';' => Ok(TokenKind::Semicolon),
            b',' => Ok(TokenKind::Comma),
            _ => Err(self.error(&format!("unexpected character: {:?}", ch as char))),
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();
        let line = self.line;
        let col = self.col;
        let kind = self.next_kind()?;
        Ok(Token::new(kind, line, col))
    }

    /// Tokenize entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple() {
        assert_eq!(
            kinds("int x = 42;"),
            vec![
                TokenKind::Int,
                TokenKind::Ident("x".to_string()),
                TokenKind::Eq,
                TokenKind::IntLit(42),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("== != <= >= && || < > !"),
            vec![
                TokenKind::EqEq,
                TokenKind::BangEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::AmpAmp,
                TokenKind::PipePipe,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("const char *p; void f();"),
            vec![
                TokenKind::Const,
                TokenKind::Char,
                TokenKind::Star,
                TokenKind::Ident("p".to_string()),
                TokenKind::Semicolon,
                TokenKind::Void,
                TokenKind::Ident("f".to_string()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_char_literal_is_int() {
        assert_eq!(
            kinds("'A' '\\n' '\\0' '\\''"),
            vec![
                TokenKind::IntLit(65),
                TokenKind::IntLit(10),
                TokenKind::IntLit(0),
                TokenKind::IntLit(39),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\tb\n\"q\"\\""#),
            vec![
                TokenKind::StringLit(b"a\tb\n\"q\"\\".to_vec()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unknown_escape_taken_verbatim() {
        assert_eq!(
            kinds(r#""\q""#),
            vec![TokenKind::StringLit(b"q".to_vec()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("a // line\n/* block\nstill */ b"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Ident("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let mut lexer = Lexer::new("int\n  x;");
        let tokens = lexer.tokenize().unwrap();
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].col), (2, 3));
        assert_eq!((tokens[2].line, tokens[2].col), (2, 4));
    }

    #[test]
    fn test_lone_pipe_rejected() {
        let mut lexer = Lexer::new("a | b");
        let err = lexer.tokenize().unwrap_err();
        assert!(err.message.contains('|'), "message: {}", err.message);
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("\"abc");
        assert!(lexer.tokenize().is_err());
    }

    #[test]
    fn test_unterminated_char() {
        let mut lexer = Lexer::new("'a");
        assert!(lexer.tokenize().is_err());
    }
}
