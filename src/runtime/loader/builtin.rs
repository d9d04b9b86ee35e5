//! Built-in and frozen modules.
//!
//! Neither touches the filesystem: built-in modules are populated by a
//! registered init function, frozen modules carry their source text and are
//! compiled on demand.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::runtime::code::CodeObject;
use crate::runtime::error::{Exception, ImportError, ImportResult};
use crate::runtime::module::Module;
use crate::runtime::spec::ModuleSpec;
use crate::runtime::ImportSystem;

/// Populates a freshly created built-in module.
pub type BuiltinInit = Arc<dyn Fn(&Module) -> Result<(), Exception> + Send + Sync>;

/// Built-in modules available to the builtin finder.
#[derive(Default)]
pub struct BuiltinRegistry {
    modules: DashMap<String, BuiltinInit>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, init: F)
    where
        F: Fn(&Module) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Arc::new(init));
    }

    pub fn get(&self, name: &str) -> Option<BuiltinInit> {
        self.modules.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

/// Loader for built-in modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLoader;

impl BuiltinLoader {
    pub fn create_module(&self, spec: &ModuleSpec, sys: &ImportSystem) -> ImportResult<Arc<Module>> {
        let name = spec.name();
        let init = sys
            .builtins()
            .get(name)
            .ok_or_else(|| ImportError::import(name, format!("no built-in module named {}", name)))?;
        let module = Module::new(name);
        init(&module)?;
        Ok(Arc::new(module))
    }
}

/// Source text embedded in the frozen registry.
#[derive(Debug, Clone)]
pub struct FrozenModule {
    pub source: Arc<str>,
    pub is_package: bool,
}

/// Frozen modules available to the frozen finder.
#[derive(Default)]
pub struct FrozenRegistry {
    modules: DashMap<String, FrozenModule>,
}

impl FrozenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, source: impl Into<Arc<str>>, is_package: bool) {
        self.modules.insert(
            name.into(),
            FrozenModule {
                source: source.into(),
                is_package,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<FrozenModule> {
        self.modules.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl fmt::Debug for FrozenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

/// Loader for frozen modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrozenLoader;

impl FrozenLoader {
    fn lookup(name: &str, sys: &ImportSystem) -> ImportResult<FrozenModule> {
        sys.frozen()
            .get(name)
            .ok_or_else(|| ImportError::import(name, format!("No such frozen object named '{}'", name)))
    }

    pub fn get_code(&self, name: &str, sys: &ImportSystem) -> ImportResult<CodeObject> {
        let frozen = Self::lookup(name, sys)?;
        Ok(sys.compiler().compile(&frozen.source, &format!("<frozen {}>", name))?)
    }

    pub fn get_source(&self, name: &str, sys: &ImportSystem) -> ImportResult<String> {
        Ok(Self::lookup(name, sys)?.source.to_string())
    }

    pub fn is_package(&self, name: &str, sys: &ImportSystem) -> ImportResult<bool> {
        Ok(Self::lookup(name, sys)?.is_package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Value;

    #[test]
    fn test_builtin_registry() {
        let registry = BuiltinRegistry::new();
        registry.register("answers", |m: &Module| {
            m.set_attr("value", Value::Int(42))
                .map_err(|e| Exception::new("AttributeError", e.to_string()))
        });
        assert!(registry.contains("answers"));
        assert_eq!(registry.names(), vec!["answers"]);

        let module = Module::new("answers");
        (registry.get("answers").unwrap())(&module).unwrap();
        assert_eq!(module.get_attr("value"), Some(Value::Int(42)));
    }

    #[test]
    fn test_frozen_registry() {
        let registry = FrozenRegistry::new();
        registry.register("hello", "greeting = \"hi\"\n", false);
        registry.register("bundle", "", true);
        assert!(!registry.get("hello").unwrap().is_package);
        assert!(registry.get("bundle").unwrap().is_package);
        assert!(registry.get("missing").is_none());
    }
}
