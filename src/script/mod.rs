//! Module Scripts
//!
//! A deliberately small module language used to drive the runtime end to
//! end: imports in every form the import statement supports, assignments of
//! literal or referenced values, and `raise`.
//!
//! ```text
//! # pkg/__init__.mod
//! from . import helpers
//! from .helpers import greet as hello
//! import other.util as util
//! version = 3
//! __all__ = ["hello", "version"]
//! ```
//!
//! `ScriptCompiler` and `ScriptExecutor` implement the runtime's
//! `Compiler` and `Executor` collaborators. Compiled code is the parsed
//! [`ast::Program`], serialized as JSON inside artifacts.

pub mod ast;
pub mod lexer;
pub mod parser;

use std::sync::Arc;

use tracing::trace;

use crate::runtime::{
    CodeFormatError, CodeObject, CompileError, Compiler, Exception, Executor, ImportError, ImportResult,
    ImportSystem, Module, Value,
};
use ast::{Expr, ImportNames, Program, Statement, StmtKind};
use lexer::Lexer;
use parser::Parser;

/// Parse script source into a `Program`.
pub fn parse_program(source: &str, filename: &str) -> Result<Program, CompileError> {
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|e| CompileError::new(filename, e.line, e.message))?;
    Parser::new(tokens)
        .parse()
        .map_err(|e| CompileError::new(filename, e.line, e.message))
}

/// Compiles module scripts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptCompiler;

impl ScriptCompiler {
    pub fn new() -> Self {
        ScriptCompiler
    }
}

impl Compiler for ScriptCompiler {
    fn compile(&self, source: &str, filename: &str) -> Result<CodeObject, CompileError> {
        let program = parse_program(source, filename)?;
        Ok(CodeObject::new(filename, program))
    }

    fn serialize(&self, code: &CodeObject) -> Result<Vec<u8>, CodeFormatError> {
        let program = code
            .body::<Program>()
            .ok_or_else(|| CodeFormatError("code object is not a script program".to_string()))?;
        serde_json::to_vec(program).map_err(|e| CodeFormatError(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8], filename: &str) -> Result<CodeObject, CodeFormatError> {
        let program: Program = serde_json::from_slice(bytes).map_err(|e| CodeFormatError(e.to_string()))?;
        Ok(CodeObject::new(filename, program))
    }
}

/// Executes module scripts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptExecutor;

impl ScriptExecutor {
    pub fn new() -> Self {
        ScriptExecutor
    }
}

impl Executor for ScriptExecutor {
    fn execute(&self, code: &CodeObject, module: &Arc<Module>, sys: &ImportSystem) -> ImportResult<()> {
        let program = code.body::<Program>().ok_or_else(|| {
            ImportError::import(module.name(), "code object was not produced by the script compiler")
        })?;
        for statement in &program.statements {
            trace!(module = %module.name(), line = statement.line, "exec");
            exec_statement(statement, module, sys)?;
        }
        Ok(())
    }
}

fn bind(module: &Module, name: &str, value: Value) -> ImportResult<()> {
    module
        .set_attr(name, value)
        .map_err(|e| Exception::new("AttributeError", e.to_string()).into())
}

fn exec_statement(statement: &Statement, module: &Arc<Module>, sys: &ImportSystem) -> ImportResult<()> {
    match &statement.kind {
        StmtKind::Import { module: name, alias: None } => {
            let top = sys.import(name, Some(module.as_ref()), &[], 0)?;
            let top_name = name.split_once('.').map_or(name.as_str(), |(top, _)| top);
            bind(module, top_name, Value::Module(top))
        }
        StmtKind::Import {
            module: name,
            alias: Some(alias),
        } => {
            let target = sys.gcd_import(name, None, 0)?;
            bind(module, alias, Value::Module(target))
        }
        StmtKind::FromImport { level, module: name, names } => {
            let fromlist: Vec<String> = match names {
                ImportNames::Star => vec!["*".to_string()],
                ImportNames::Names(names) => names.iter().map(|(n, _)| n.clone()).collect(),
            };
            let source = sys.import(name, Some(module.as_ref()), &fromlist, *level)?;
            match names {
                ImportNames::Star => {
                    for public in source.public_names() {
                        let value = source.get_attr(&public).ok_or_else(|| {
                            Exception::new(
                                "AttributeError",
                                format!("module '{}' has no attribute '{}'", source.name(), public),
                            )
                        })?;
                        bind(module, &public, value)?;
                    }
                    Ok(())
                }
                ImportNames::Names(names) => {
                    for (imported, alias) in names {
                        let value = import_from(&source, imported, sys)?;
                        bind(module, alias.as_deref().unwrap_or(imported), value)?;
                    }
                    Ok(())
                }
            }
        }
        StmtKind::Assign { target, value } => {
            let value = eval(value, module)?;
            bind(module, target, value)
        }
        StmtKind::Raise { kind, message } => Err(Exception::new(kind.as_str(), message.as_str()).into()),
    }
}

/// Resolve one `from x import name`: an attribute of `x`, else a
/// registered submodule `x.name`.
fn import_from(source: &Arc<Module>, name: &str, sys: &ImportSystem) -> ImportResult<Value> {
    if let Some(value) = source.get_attr(name) {
        return Ok(value);
    }
    let full = format!("{}.{}", source.name(), name);
    if let Some(submodule) = sys.module(&full) {
        return Ok(Value::Module(submodule));
    }
    let location = source.file().unwrap_or_else(|| "unknown location".to_string());
    let message = if source.is_initializing() {
        format!(
            "cannot import name '{}' from partially initialized module '{}' (most likely due to a circular import) ({})",
            name,
            source.name(),
            location
        )
    } else {
        format!("cannot import name '{}' from '{}' ({})", name, source.name(), location)
    };
    Err(ImportError::import(source.name(), message))
}

fn eval(expr: &Expr, module: &Module) -> ImportResult<Value> {
    Ok(match expr {
        Expr::None => Value::None,
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Int(n) => Value::Int(*n),
        Expr::Str(s) => Value::str(s),
        Expr::List(items) => Value::List(Arc::new(
            items.iter().map(|item| eval(item, module)).collect::<ImportResult<Vec<_>>>()?,
        )),
        Expr::Ref(parts) => {
            let (first, rest) = parts
                .split_first()
                .ok_or_else(|| Exception::new("NameError", "empty reference"))?;
            let mut value = module
                .get_attr(first)
                .ok_or_else(|| Exception::new("NameError", format!("name '{}' is not defined", first)))?;
            for part in rest {
                let Value::Module(owner) = &value else {
                    return Err(Exception::new(
                        "AttributeError",
                        format!("'{}' object has no attribute '{}'", value.type_name(), part),
                    )
                    .into());
                };
                let next = owner.get_attr(part).ok_or_else(|| {
                    Exception::new(
                        "AttributeError",
                        format!("module '{}' has no attribute '{}'", owner.name(), part),
                    )
                })?;
                value = next;
            }
            value
        }
    })
}
