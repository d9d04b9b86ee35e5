//! Module Registry
//!
//! Process-wide mapping from module name to live module object.
//!
//! Insertion order is tracked because it drives teardown: a module that
//! finishes importing is moved to the end, so dependencies always precede
//! the modules that imported them and `drain_for_shutdown` can tear down in
//! reverse.
//!
//! Presence does not imply the module finished executing; a module is
//! registered *before* its body runs so that circular imports observe the
//! partially built module instead of recursing.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::module::Module;

#[derive(Default)]
struct RegistryInner {
    /// name → (insertion sequence, module)
    entries: HashMap<String, (u64, Arc<Module>)>,
    /// insertion sequence → name
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl RegistryInner {
    fn push_back(&mut self, name: &str, module: Arc<Module>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, name.to_string());
        self.entries.insert(name.to_string(), (seq, module));
    }
}

/// Insertion-ordered registry of loaded modules.
#[derive(Default)]
pub struct ModuleRegistry {
    inner: RwLock<RegistryInner>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        self.inner.read().entries.get(name).map(|(_, m)| Arc::clone(m))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().entries.contains_key(name)
    }

    /// Bind `name` to `module`. Replacing an existing entry keeps its
    /// position; a new entry goes to the end.
    pub fn insert(&self, name: &str, module: Arc<Module>) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.entries.get_mut(name) {
            entry.1 = module;
            return;
        }
        inner.push_back(name, module);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Module>> {
        let mut inner = self.inner.write();
        let (seq, module) = inner.entries.remove(name)?;
        inner.order.remove(&seq);
        Some(module)
    }

    /// Move `name` to the end of the insertion order, returning whatever
    /// module is bound to it now.
    pub fn move_to_end(&self, name: &str) -> Option<Arc<Module>> {
        let mut inner = self.inner.write();
        let (seq, module) = inner.entries.remove(name)?;
        inner.order.remove(&seq);
        inner.push_back(name, Arc::clone(&module));
        Some(module)
    }

    /// Module names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().order.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every module, most recently completed first.
    pub fn drain_for_shutdown(&self) -> Vec<(String, Arc<Module>)> {
        let mut inner = self.inner.write();
        let order = std::mem::take(&mut inner.order);
        let mut entries = std::mem::take(&mut inner.entries);
        order
            .into_values()
            .rev()
            .filter_map(|name| entries.remove(&name).map(|(_, m)| (name, m)))
            .collect()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str) -> Arc<Module> {
        Arc::new(Module::new(name))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = ModuleRegistry::new();
        let m = module("a");
        registry.insert("a", Arc::clone(&m));

        assert!(registry.contains("a"));
        assert!(Arc::ptr_eq(&registry.get("a").unwrap(), &m));
        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insertion_order_and_move_to_end() {
        let registry = ModuleRegistry::new();
        for name in ["a", "b", "c"] {
            registry.insert(name, module(name));
        }
        assert_eq!(registry.names(), vec!["a", "b", "c"]);

        registry.move_to_end("a");
        assert_eq!(registry.names(), vec!["b", "c", "a"]);
        assert!(registry.move_to_end("missing").is_none());
    }

    #[test]
    fn test_replace_keeps_position() {
        let registry = ModuleRegistry::new();
        registry.insert("a", module("a"));
        registry.insert("b", module("b"));
        let replacement = module("a2");
        registry.insert("a", Arc::clone(&replacement));

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
        assert!(Arc::ptr_eq(&registry.get("a").unwrap(), &replacement));
    }

    #[test]
    fn test_drain_for_shutdown_is_reverse_order() {
        let registry = ModuleRegistry::new();
        for name in ["base", "mid", "top"] {
            registry.insert(name, module(name));
        }
        let drained: Vec<String> = registry
            .drain_for_shutdown()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(drained, vec!["top", "mid", "base"]);
        assert!(registry.is_empty());
    }
}
