//! Lexer for module scripts.
//!
//! Statements are line-oriented, so newlines are tokens. `#` starts a
//! comment that runs to the end of the line.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Integer(i64),
    String(String),
    Dot,
    Comma,
    Star,
    Equals,
    LBracket,
    RBracket,
    Newline,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::Integer(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::Star => write!(f, "*"),
            Token::Equals => write!(f, "="),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Newline => write!(f, "newline"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// A token and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Lexing failure with its line.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            line: self.line,
            message: message.into(),
        }
    }

    /// Skip spaces and comments, stopping at a newline.
    fn skip_blank(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '#' {
                while let Some(c) = self.current() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch != '\n' && ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self) -> Result<String, LexError> {
        let mut result = String::new();
        self.advance(); // opening quote
        while let Some(ch) = self.current() {
            match ch {
                '"' => {
                    self.advance();
                    return Ok(result);
                }
                '\n' => break,
                '\\' => {
                    self.advance();
                    match self.advance() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some(c) => result.push(c),
                        None => return Err(self.error("unexpected end of string")),
                    }
                }
                c => {
                    result.push(c);
                    self.advance();
                }
            }
        }
        Err(self.error("unclosed string literal"))
    }

    fn read_integer(&mut self) -> Result<i64, LexError> {
        let mut text = String::new();
        if self.current() == Some('-') {
            text.push('-');
            self.advance();
        }
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    text.push(ch);
                }
                self.advance();
            } else {
                break;
            }
        }
        text.parse()
            .map_err(|_| self.error(format!("invalid integer literal '{}'", text)))
    }

    fn read_ident(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    pub fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_blank();
        let line = self.line;
        let token = match self.current() {
            None => Token::Eof,
            Some('\n') => {
                self.advance();
                Token::Newline
            }
            Some('"') => Token::String(self.read_string()?),
            Some('-') if self.peek(1).map_or(false, |c| c.is_ascii_digit()) => {
                Token::Integer(self.read_integer()?)
            }
            Some(c) if c.is_ascii_digit() => Token::Integer(self.read_integer()?),
            Some(c) if c.is_alphabetic() || c == '_' => Token::Ident(self.read_ident()),
            Some(c) => {
                self.advance();
                match c {
                    '.' => Token::Dot,
                    ',' => Token::Comma,
                    '*' => Token::Star,
                    '=' => Token::Equals,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    other => return Err(self.error(format!("unexpected character '{}'", other))),
                }
            }
        };
        Ok(Spanned { token, line })
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_lexer_import_line() {
        assert_eq!(
            kinds("from ..pkg import *"),
            vec![
                Token::Ident("from".into()),
                Token::Dot,
                Token::Dot,
                Token::Ident("pkg".into()),
                Token::Ident("import".into()),
                Token::Star,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_literals() {
        assert_eq!(
            kinds("x = [-3, \"a\\\"b\"] # trailing"),
            vec![
                Token::Ident("x".into()),
                Token::Equals,
                Token::LBracket,
                Token::Integer(-3),
                Token::Comma,
                Token::String("a\"b".into()),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_tracks_lines() {
        let tokens = Lexer::new("a\n\nb").tokenize().unwrap();
        let b = tokens.iter().find(|s| s.token == Token::Ident("b".into())).unwrap();
        assert_eq!(b.line, 3);
    }

    #[test]
    fn test_lexer_unclosed_string() {
        let err = Lexer::new("x = \"open\n").tokenize().unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_lexer_rejects_unknown_character() {
        assert!(Lexer::new("x = 1 + 2").tokenize().is_err());
    }
}
