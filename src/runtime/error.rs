//! Error taxonomy for the import machinery.
//!
//! Only a handful of kinds ever reach the caller of an import:
//!
//! - `ModuleNotFound` - no finder produced a spec for the name.
//! - `Deadlock` - acquiring a module lock would have closed a wait cycle.
//! - `Syntax` / `Raised` - failures that originate in user code; they pass
//!   through the machinery untouched so the caller sees the real origin.
//! - `Import` - the loader itself could not produce the module (not a
//!   package, bad magic in a compiled-only file, missing native entry point).
//!
//! Bookkeeping failures (`CacheError`, `AttributeError`) are recovered
//! locally and never surface through `ImportError`.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Errors surfaced by the import machinery.
#[derive(Debug, Clone, Error)]
pub enum ImportError {
    /// No finder could produce a spec for the module.
    #[error("{message}")]
    ModuleNotFound { name: String, message: String },

    /// Granting a module lock would have deadlocked.
    #[error(transparent)]
    Deadlock(#[from] DeadlockError),

    /// A loader or finder failed to produce the module.
    #[error("{message}")]
    Import { name: Option<String>, message: String },

    /// The module name (or relative import request) is malformed.
    #[error("{0}")]
    InvalidName(String),

    /// Source text failed to compile.
    #[error(transparent)]
    Syntax(#[from] CompileError),

    /// User code raised while executing a module body.
    #[error(transparent)]
    Raised(#[from] Exception),

    /// A required file could not be read.
    #[error("failed to read '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl ImportError {
    /// Build a `ModuleNotFound` error with the conventional message.
    pub fn not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        let message = format!("No module named '{}'", name);
        ImportError::ModuleNotFound { name, message }
    }

    /// Build a `ModuleNotFound` error with a custom message.
    pub fn not_found_with(name: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::ModuleNotFound {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Build a generic loader failure tied to a module name.
    pub fn import(name: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::Import {
            name: Some(name.into()),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// The module name this error refers to, when known.
    pub fn name(&self) -> Option<&str> {
        match self {
            ImportError::ModuleNotFound { name, .. } => Some(name),
            ImportError::Deadlock(err) => Some(&err.name),
            ImportError::Import { name, .. } => name.as_deref(),
            _ => None,
        }
    }

    /// True for `ModuleNotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImportError::ModuleNotFound { .. })
    }
}

/// Raised when acquiring a module lock would close a cycle in the
/// blocking-on graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("deadlock detected by module lock '{name}'")]
pub struct DeadlockError {
    pub name: String,
}

/// Misuse of a module lock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("cannot release un-acquired lock '{0}'")]
    NotOwner(String),
}

/// Compilation failure reported by a `Compiler`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{filename}:{line}: {message}")]
pub struct CompileError {
    pub filename: String,
    pub line: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(filename: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            line,
            message: message.into(),
        }
    }
}

/// Failure to serialize or deserialize a code object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed code object: {0}")]
pub struct CodeFormatError(pub String);

/// An exception raised by user code during module execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Exception {
    pub kind: String,
    pub message: String,
}

impl Exception {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Reasons a compiled-artifact entry is rejected.
///
/// Never surfaced by the source loader: every variant downgrades to
/// recompiling from source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("bad magic number in '{name}': {found:02x?}")]
    BadMagic { name: String, found: Vec<u8> },

    #[error("compiled artifact for '{name}' is truncated")]
    Truncated { name: String },

    #[error("invalid flags {flags:#x} in compiled artifact for '{name}'")]
    InvalidFlags { name: String, flags: u32 },

    #[error("compiled artifact for '{name}' is stale ({reason})")]
    Stale { name: String, reason: &'static str },

    #[error("compiled artifact for '{name}' is malformed: {message}")]
    Malformed { name: String, message: String },
}

/// A module object refused an attribute assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("module '{module}' does not accept attribute '{attr}'")]
pub struct AttributeError {
    pub module: String,
    pub attr: String,
}
