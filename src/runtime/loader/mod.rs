//! Loaders
//!
//! A loader turns a spec into executed module state. The set of loader
//! kinds is closed, so dispatch is a `match` over [`Loader`]:
//!
//! | Kind       | Code comes from                        | `get_code`      |
//! |------------|----------------------------------------|-----------------|
//! | Source     | source file via the artifact cache     | always some     |
//! | Sourceless | compiled-only artifact                 | always some     |
//! | Builtin    | init function in the builtin registry  | none            |
//! | Frozen     | source embedded in the frozen registry | always some     |
//! | Extension  | native binding entry points            | none            |
//! | Namespace  | nothing (empty code)                   | empty           |

mod builtin;
mod extension;
mod namespace;
mod source;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use builtin::{BuiltinInit, BuiltinLoader, BuiltinRegistry, FrozenLoader, FrozenModule, FrozenRegistry};
pub use extension::{ExtensionFileLoader, NativeCreate, NativeExec, NativeModule, NativeRegistry};
pub use namespace::NamespaceLoader;
pub use source::{SourceFileLoader, SourcelessFileLoader};

use super::code::CodeObject;
use super::error::{ImportError, ImportResult};
use super::module::Module;
use super::spec::ModuleSpec;
use super::ImportSystem;

/// Loader variants.
pub enum Loader {
    Source(SourceFileLoader),
    Sourceless(SourcelessFileLoader),
    Builtin(BuiltinLoader),
    Frozen(FrozenLoader),
    Extension(ExtensionFileLoader),
    Namespace(NamespaceLoader),
}

/// Discriminant of a [`Loader`], for logging and matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    Source,
    Sourceless,
    Builtin,
    Frozen,
    Extension,
    Namespace,
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoaderKind::Source => "source",
            LoaderKind::Sourceless => "sourceless",
            LoaderKind::Builtin => "builtin",
            LoaderKind::Frozen => "frozen",
            LoaderKind::Extension => "extension",
            LoaderKind::Namespace => "namespace",
        };
        f.write_str(name)
    }
}

impl Loader {
    pub fn kind(&self) -> LoaderKind {
        match self {
            Loader::Source(_) => LoaderKind::Source,
            Loader::Sourceless(_) => LoaderKind::Sourceless,
            Loader::Builtin(_) => LoaderKind::Builtin,
            Loader::Frozen(_) => LoaderKind::Frozen,
            Loader::Extension(_) => LoaderKind::Extension,
            Loader::Namespace(_) => LoaderKind::Namespace,
        }
    }

    /// Create the module object, or `None` to let the caller create a
    /// default empty module.
    pub fn create_module(&self, spec: &Arc<ModuleSpec>, sys: &ImportSystem) -> ImportResult<Option<Arc<Module>>> {
        match self {
            Loader::Builtin(l) => l.create_module(spec, sys).map(Some),
            Loader::Extension(l) => l.create_module(spec, sys).map(Some),
            Loader::Source(_) | Loader::Sourceless(_) | Loader::Frozen(_) | Loader::Namespace(_) => Ok(None),
        }
    }

    /// Execute the module body into `module`.
    pub fn exec_module(&self, module: &Arc<Module>, sys: &ImportSystem) -> ImportResult<()> {
        match self {
            Loader::Builtin(_) | Loader::Namespace(_) => Ok(()),
            Loader::Extension(l) => l.exec_module(module, sys),
            Loader::Source(_) | Loader::Sourceless(_) | Loader::Frozen(_) => {
                let code = self.get_code(module.name(), sys)?.ok_or_else(|| {
                    ImportError::import(
                        module.name(),
                        format!("cannot load module '{}' when get_code() returns none", module.name()),
                    )
                })?;
                sys.executor().execute(&code, module, sys)
            }
        }
    }

    /// Code for `name`. `None` means "no inspectable code", not an error.
    pub fn get_code(&self, name: &str, sys: &ImportSystem) -> ImportResult<Option<CodeObject>> {
        match self {
            Loader::Source(l) => l.get_code(name, sys).map(Some),
            Loader::Sourceless(l) => l.get_code(name, sys).map(Some),
            Loader::Frozen(l) => l.get_code(name, sys).map(Some),
            Loader::Namespace(l) => l.get_code(sys).map(Some),
            Loader::Builtin(_) | Loader::Extension(_) => Ok(None),
        }
    }

    pub fn get_source(&self, name: &str, sys: &ImportSystem) -> ImportResult<Option<String>> {
        match self {
            Loader::Source(l) => l.get_source(name, sys).map(Some),
            Loader::Frozen(l) => l.get_source(name, sys).map(Some),
            Loader::Namespace(_) => Ok(Some(String::new())),
            Loader::Sourceless(_) | Loader::Builtin(_) | Loader::Extension(_) => Ok(None),
        }
    }

    pub fn is_package(&self, name: &str, sys: &ImportSystem) -> ImportResult<bool> {
        match self {
            Loader::Source(l) => Ok(l.is_package(name, sys)),
            Loader::Sourceless(l) => Ok(l.is_package(name, sys)),
            Loader::Extension(l) => Ok(l.is_package(name, sys)),
            Loader::Frozen(l) => l.is_package(name, sys),
            Loader::Builtin(_) => Ok(false),
            Loader::Namespace(_) => Ok(true),
        }
    }

    /// File backing this loader, for file-based kinds.
    pub fn filename(&self) -> Option<&Path> {
        match self {
            Loader::Source(l) => Some(l.path()),
            Loader::Sourceless(l) => Some(l.path()),
            Loader::Extension(l) => Some(l.path()),
            Loader::Builtin(_) | Loader::Frozen(_) | Loader::Namespace(_) => None,
        }
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Loader");
        s.field("kind", &self.kind());
        if let Some(path) = self.filename() {
            s.field("path", &path);
        }
        s.finish()
    }
}

/// `name` names a package when its file is the package initializer and the
/// module itself is not literally called that.
fn file_is_package(path: &Path, name: &str, package_init: &str) -> bool {
    let stem = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.split_once('.').map_or(n, |(stem, _)| stem));
    let tail = name.rsplit_once('.').map_or(name, |(_, tail)| tail);
    stem == Some(package_init) && tail != package_init
}

/// File-backed loaders only serve the name they were created for.
fn check_name(expected: &str, requested: &str) -> ImportResult<()> {
    if expected != requested {
        return Err(ImportError::import(
            requested,
            format!("loader for {} cannot handle {}", expected, requested),
        ));
    }
    Ok(())
}
