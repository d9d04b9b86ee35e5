//! Syntax tree for module scripts.
//!
//! The tree is also the compiled form: it serializes through serde, which
//! is what lands in compiled artifacts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `import a.b` binds `a`; `import a.b as x` binds `x` to `a.b`.
    Import { module: String, alias: Option<String> },
    /// `from ..a import b, c as d` / `from a import *`
    FromImport {
        level: usize,
        module: String,
        names: ImportNames,
    },
    /// `name = expr`
    Assign { target: String, value: Expr },
    /// `raise [Kind] "message"`
    Raise { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportNames {
    Star,
    Names(Vec<(String, Option<String>)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Expr>),
    /// A name, optionally followed by attribute accesses: `a.b.c`.
    Ref(Vec<String>),
}
