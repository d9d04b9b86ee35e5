//! Parser for module scripts.
//!
//! ```text
//! statement := import dotted [as ident]
//!            | from dots* [dotted] import (* | ident [as ident] (, ident [as ident])*)
//!            | ident = expr
//!            | raise [ident] string
//! expr      := none | true | false | int | string | [ expr (, expr)* ] | dotted
//! ```

use super::ast::{Expr, ImportNames, Program, Statement, StmtKind};
use super::lexer::{Spanned, Token};

/// Parse failure with its line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

const KEYWORDS: &[&str] = &["import", "from", "as", "raise", "none", "true", "false"];

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).map_or(&Token::Eof, |s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |s| s.line)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if *self.current() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found '{}'", expected, self.current())))
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), Token::Ident(s) if s == keyword)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.is_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found '{}'", keyword, self.current())))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.current().clone() {
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected a name, found '{}'", other))),
        }
    }

    fn dotted(&mut self) -> Result<Vec<String>, ParseError> {
        let mut parts = vec![self.ident()?];
        while *self.current() == Token::Dot {
            self.advance();
            parts.push(self.ident()?);
        }
        Ok(parts)
    }

    fn alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.is_keyword("as") {
            self.advance();
            return self.ident().map(Some);
        }
        Ok(None)
    }

    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        match self.current() {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::Eof => Ok(()),
            other => Err(self.error(format!("unexpected '{}' at end of statement", other))),
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        loop {
            match self.current() {
                Token::Eof => break,
                Token::Newline => self.advance(),
                _ => {
                    let line = self.line();
                    let kind = self.statement()?;
                    self.end_of_statement()?;
                    statements.push(Statement { line, kind });
                }
            }
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<StmtKind, ParseError> {
        if self.is_keyword("import") {
            self.advance();
            let module = self.dotted()?.join(".");
            let alias = self.alias()?;
            return Ok(StmtKind::Import { module, alias });
        }
        if self.is_keyword("from") {
            self.advance();
            return self.from_import();
        }
        if self.is_keyword("raise") {
            self.advance();
            let kind = match self.current() {
                Token::Ident(_) => self.ident()?,
                _ => "Error".to_string(),
            };
            let message = match self.current().clone() {
                Token::String(s) => {
                    self.advance();
                    s
                }
                other => return Err(self.error(format!("expected a message string, found '{}'", other))),
            };
            return Ok(StmtKind::Raise { kind, message });
        }
        let target = self.ident()?;
        self.expect(Token::Equals)?;
        let value = self.expr()?;
        Ok(StmtKind::Assign { target, value })
    }

    fn from_import(&mut self) -> Result<StmtKind, ParseError> {
        let mut level = 0;
        while *self.current() == Token::Dot {
            level += 1;
            self.advance();
        }
        let module = if self.is_keyword("import") {
            if level == 0 {
                return Err(self.error("expected a module name after 'from'"));
            }
            String::new()
        } else {
            self.dotted()?.join(".")
        };
        self.expect_keyword("import")?;

        if *self.current() == Token::Star {
            self.advance();
            return Ok(StmtKind::FromImport {
                level,
                module,
                names: ImportNames::Star,
            });
        }
        let mut names = Vec::new();
        loop {
            let name = self.ident()?;
            let alias = self.alias()?;
            names.push((name, alias));
            if *self.current() != Token::Comma {
                break;
            }
            self.advance();
        }
        Ok(StmtKind::FromImport {
            level,
            module,
            names: ImportNames::Names(names),
        })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        match self.current().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if *self.current() != Token::RBracket {
                    loop {
                        items.push(self.expr()?);
                        if *self.current() != Token::Comma {
                            break;
                        }
                        self.advance();
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::Ident(word) => match word.as_str() {
                "none" => {
                    self.advance();
                    Ok(Expr::None)
                }
                "true" | "false" => {
                    self.advance();
                    Ok(Expr::Bool(word == "true"))
                }
                _ => self.dotted().map(Expr::Ref),
            },
            other => Err(self.error(format!("expected an expression, found '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::Lexer;

    fn parse(input: &str) -> Result<Program, ParseError> {
        let tokens = Lexer::new(input).tokenize().map_err(|e| ParseError {
            line: e.line,
            message: e.message,
        })?;
        Parser::new(tokens).parse()
    }

    fn kinds(input: &str) -> Vec<StmtKind> {
        parse(input).unwrap().statements.into_iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_parse_imports() {
        assert_eq!(
            kinds("import a.b\nimport c as d"),
            vec![
                StmtKind::Import {
                    module: "a.b".into(),
                    alias: None
                },
                StmtKind::Import {
                    module: "c".into(),
                    alias: Some("d".into())
                },
            ]
        );
    }

    #[test]
    fn test_parse_from_imports() {
        assert_eq!(
            kinds("from . import x, y as z\nfrom ..pkg.sub import *"),
            vec![
                StmtKind::FromImport {
                    level: 1,
                    module: String::new(),
                    names: ImportNames::Names(vec![("x".into(), None), ("y".into(), Some("z".into()))]),
                },
                StmtKind::FromImport {
                    level: 2,
                    module: "pkg.sub".into(),
                    names: ImportNames::Star,
                },
            ]
        );
    }

    #[test]
    fn test_parse_assignments() {
        assert_eq!(
            kinds("x = [1, \"two\", none, true]\ny = a.b"),
            vec![
                StmtKind::Assign {
                    target: "x".into(),
                    value: Expr::List(vec![Expr::Int(1), Expr::Str("two".into()), Expr::None, Expr::Bool(true)]),
                },
                StmtKind::Assign {
                    target: "y".into(),
                    value: Expr::Ref(vec!["a".into(), "b".into()]),
                },
            ]
        );
    }

    #[test]
    fn test_parse_raise_defaults_kind() {
        assert_eq!(
            kinds("raise \"boom\"\nraise ValueError \"bad\""),
            vec![
                StmtKind::Raise {
                    kind: "Error".into(),
                    message: "boom".into()
                },
                StmtKind::Raise {
                    kind: "ValueError".into(),
                    message: "bad".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse("x = 1\ny = \nz = 3").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_parse_rejects_absolute_from_without_module() {
        assert!(parse("from import x").is_err());
    }

    #[test]
    fn test_blank_and_comment_lines() {
        let program = parse("# header\n\nx = 1 # note\n").unwrap();
        assert_eq!(program.statements.len(), 1);
        assert_eq!(program.statements[0].line, 3);
    }
}
