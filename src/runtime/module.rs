//! Module Objects
//!
//! A `Module` is the live, executed unit that the registry hands out. It is
//! little more than a namespace: an attribute map plus typed accessors for the
//! well-known attributes the import machinery maintains (`__name__`,
//! `__loader__`, `__package__`, `__spec__`, `__path__`, `__file__`,
//! `__cached__`).
//!
//! A module can refuse assignment of particular attributes (native modules
//! with fixed slots do this). Callers inside the import machinery treat a
//! refusal as a warning, never as a load failure.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::AttributeError;
use super::finder::SearchLocations;
use super::loader::Loader;
use super::spec::ModuleSpec;
use super::value::Value;

/// Well-known attribute names maintained by the import machinery.
pub mod attr {
    pub const NAME: &str = "__name__";
    pub const LOADER: &str = "__loader__";
    pub const PACKAGE: &str = "__package__";
    pub const SPEC: &str = "__spec__";
    pub const PATH: &str = "__path__";
    pub const FILE: &str = "__file__";
    pub const CACHED: &str = "__cached__";
    pub const ALL: &str = "__all__";
}

/// A loaded (or loading) module.
pub struct Module {
    /// Name the module was created with. `__name__` may later diverge.
    name: Arc<str>,

    /// Namespace bindings.
    attrs: RwLock<HashMap<String, Value>>,

    /// Attribute names this module refuses to have assigned.
    refused: RwLock<HashSet<String>>,
}

impl Module {
    /// Create an empty module with `__name__` bound.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let mut attrs = HashMap::new();
        attrs.insert(attr::NAME.to_string(), Value::Str(name.clone()));
        Self {
            name,
            attrs: RwLock::new(attrs),
            refused: RwLock::new(HashSet::new()),
        }
    }

    /// Create a module that refuses assignment of the given attributes.
    pub fn with_refused<I, S>(name: impl Into<Arc<str>>, refused: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let module = Self::new(name);
        module
            .refused
            .write()
            .extend(refused.into_iter().map(Into::into));
        module
    }

    /// The name the module was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.read().get(name).cloned()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.read().contains_key(name)
    }

    /// Bind an attribute, unless this module refuses it.
    pub fn set_attr(&self, name: &str, value: Value) -> Result<(), AttributeError> {
        if self.refused.read().contains(name) {
            return Err(AttributeError {
                module: self.name.to_string(),
                attr: name.to_string(),
            });
        }
        self.attrs.write().insert(name.to_string(), value);
        Ok(())
    }

    /// Remove an attribute. Returns whether it existed.
    pub fn del_attr(&self, name: &str) -> Result<bool, AttributeError> {
        if self.refused.read().contains(name) {
            return Err(AttributeError {
                module: self.name.to_string(),
                attr: name.to_string(),
            });
        }
        Ok(self.attrs.write().remove(name).is_some())
    }

    /// Drop every binding except `__name__`. Breaks reference cycles
    /// between modules that import each other.
    pub fn clear(&self) {
        let mut attrs = self.attrs.write();
        let name = attrs.remove(attr::NAME);
        let dropped = std::mem::take(&mut *attrs);
        if let Some(name) = name {
            attrs.insert(attr::NAME.to_string(), name);
        }
        drop(attrs);
        drop(dropped);
    }

    /// Mark an attribute as unassignable from now on.
    pub fn refuse_attr(&self, name: impl Into<String>) {
        self.refused.write().insert(name.into());
    }

    /// True if the attribute is missing or bound to `none`.
    pub(crate) fn attr_is_unset(&self, name: &str) -> bool {
        self.attrs.read().get(name).map_or(true, Value::is_none)
    }

    /// The `__spec__` this module was initialized from.
    pub fn spec(&self) -> Option<Arc<ModuleSpec>> {
        match self.attrs.read().get(attr::SPEC) {
            Some(Value::Spec(spec)) => Some(spec.clone()),
            _ => None,
        }
    }

    pub fn loader(&self) -> Option<Arc<Loader>> {
        match self.attrs.read().get(attr::LOADER) {
            Some(Value::Loader(loader)) => Some(loader.clone()),
            _ => None,
        }
    }

    /// `__package__` as a string, if bound to one.
    pub fn package(&self) -> Option<String> {
        self.string_attr(attr::PACKAGE)
    }

    /// `__path__`; present only on packages.
    pub fn search_locations(&self) -> Option<SearchLocations> {
        match self.attrs.read().get(attr::PATH) {
            Some(Value::Path(path)) => Some(path.clone()),
            Some(Value::List(items)) => Some(SearchLocations::fixed(
                items.iter().filter_map(|v| v.as_str().map(str::to_string)),
            )),
            _ => None,
        }
    }

    pub fn is_package(&self) -> bool {
        self.has_attr(attr::PATH)
    }

    pub fn file(&self) -> Option<String> {
        self.string_attr(attr::FILE)
    }

    pub fn cached(&self) -> Option<String> {
        self.string_attr(attr::CACHED)
    }

    /// True while the module's body is still executing.
    pub fn is_initializing(&self) -> bool {
        self.spec().map_or(false, |spec| spec.is_initializing())
    }

    /// All bound attribute names, sorted.
    pub fn dir(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attrs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names exported by a star import: `__all__` when bound to a list,
    /// otherwise every name not starting with an underscore.
    pub fn public_names(&self) -> Vec<String> {
        if let Some(all) = self.get_attr(attr::ALL).and_then(|v| v.as_str_list()) {
            return all;
        }
        let mut names: Vec<String> = self
            .attrs
            .read()
            .keys()
            .filter(|k| !k.starts_with('_'))
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn string_attr(&self, name: &str) -> Option<String> {
        self.attrs
            .read()
            .get(name)
            .and_then(|v| v.as_str().map(str::to_string))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attr_count = self.attrs.read().len();
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("attr_count", &attr_count)
            .field("initializing", &self.is_initializing())
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.file(), self.loader()) {
            (Some(file), _) => write!(f, "<module '{}' from '{}'>", self.name, file),
            (None, Some(loader)) => write!(f, "<module '{}' ({})>", self.name, loader.kind()),
            (None, None) => write!(f, "<module '{}'>", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_new_binds_name() {
        let module = Module::new("pkg.mod");
        assert_eq!(module.name(), "pkg.mod");
        assert_eq!(module.get_attr(attr::NAME), Some(Value::str("pkg.mod")));
        assert!(!module.is_package());
        assert!(!module.is_initializing());
    }

    #[test]
    fn test_set_get_del_attr() {
        let module = Module::new("m");
        module.set_attr("x", Value::Int(1)).unwrap();
        assert_eq!(module.get_attr("x"), Some(Value::Int(1)));
        assert!(module.del_attr("x").unwrap());
        assert!(!module.del_attr("x").unwrap());
    }

    #[test]
    fn test_refused_attribute() {
        let module = Module::with_refused("native", [attr::FILE]);
        let err = module.set_attr(attr::FILE, Value::str("/x")).unwrap_err();
        assert_eq!(err.attr, attr::FILE);
        assert!(module.set_attr("other", Value::Int(2)).is_ok());

        module.refuse_attr("other");
        assert!(module.set_attr("other", Value::Int(3)).is_err());
        assert_eq!(module.get_attr("other"), Some(Value::Int(2)));
    }

    #[test]
    fn test_public_names_prefers_all() {
        let module = Module::new("m");
        module.set_attr("b", Value::Int(1)).unwrap();
        module.set_attr("a", Value::Int(1)).unwrap();
        module.set_attr("_hidden", Value::Int(1)).unwrap();
        assert_eq!(module.public_names(), vec!["a", "b"]);

        module.set_attr(attr::ALL, Value::str_list(["b"])).unwrap();
        assert_eq!(module.public_names(), vec!["b"]);
    }

    #[test]
    fn test_list_path_is_search_locations() {
        let module = Module::new("pkg");
        module
            .set_attr(attr::PATH, Value::str_list(["/a", "/b"]))
            .unwrap();
        assert!(module.is_package());
        let path = module.search_locations().unwrap();
        assert_eq!(path.entries().as_slice(), ["/a", "/b"]);
    }
}
