//! Native extension modules.
//!
//! The finder locates an extension file on the search path; the module's
//! behaviour comes from entry points registered under the module's full
//! name in the [`NativeRegistry`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::file_is_package;
use crate::runtime::error::{Exception, ImportError, ImportResult};
use crate::runtime::module::Module;
use crate::runtime::spec::ModuleSpec;
use crate::runtime::ImportSystem;

/// Builds the module object for a native binding.
pub type NativeCreate = Arc<dyn Fn(&ModuleSpec) -> Result<Arc<Module>, Exception> + Send + Sync>;

/// Populates the module object of a native binding.
pub type NativeExec = Arc<dyn Fn(&Arc<Module>) -> Result<(), Exception> + Send + Sync>;

/// Entry points of one native binding. Either may be absent.
#[derive(Clone, Default)]
pub struct NativeModule {
    pub create: Option<NativeCreate>,
    pub exec: Option<NativeExec>,
}

impl NativeModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModuleSpec) -> Result<Arc<Module>, Exception> + Send + Sync + 'static,
    {
        self.create = Some(Arc::new(f));
        self
    }

    pub fn with_exec<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Module>) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.exec = Some(Arc::new(f));
        self
    }
}

/// Native bindings keyed by full module name.
#[derive(Default)]
pub struct NativeRegistry {
    bindings: DashMap<String, NativeModule>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, binding: NativeModule) {
        self.bindings.insert(name.into(), binding);
    }

    pub fn get(&self, name: &str) -> Option<NativeModule> {
        self.bindings.get(name).map(|entry| entry.value().clone())
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.bindings.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("NativeRegistry").field("bindings", &names).finish()
    }
}

/// Loader for extension files.
#[derive(Debug, Clone)]
pub struct ExtensionFileLoader {
    name: String,
    path: PathBuf,
}

impl ExtensionFileLoader {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn binding(&self, name: &str, sys: &ImportSystem) -> ImportResult<NativeModule> {
        sys.natives().get(name).ok_or_else(|| {
            ImportError::import(
                name,
                format!("native module '{}' does not define an entry point", name),
            )
        })
    }

    pub fn create_module(&self, spec: &ModuleSpec, sys: &ImportSystem) -> ImportResult<Arc<Module>> {
        let binding = self.binding(spec.name(), sys)?;
        let module = match binding.create {
            Some(create) => create(spec)?,
            None => Arc::new(Module::new(spec.name())),
        };
        debug!(module = %spec.name(), path = %self.path.display(), "extension module created");
        Ok(module)
    }

    pub fn exec_module(&self, module: &Arc<Module>, sys: &ImportSystem) -> ImportResult<()> {
        if let Some(exec) = self.binding(&self.name, sys)?.exec {
            exec(module)?;
        }
        Ok(())
    }

    pub fn is_package(&self, name: &str, sys: &ImportSystem) -> bool {
        file_is_package(&self.path, name, &sys.config().package_init)
    }
}
