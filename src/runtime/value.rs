//! Values stored in a module's namespace.

use std::fmt;
use std::sync::Arc;

use super::finder::SearchLocations;
use super::loader::Loader;
use super::module::Module;
use super::spec::ModuleSpec;

/// A value bound in a module namespace.
///
/// Runtime handles (`Module`, `Spec`, `Loader`, `Path`) compare by identity;
/// plain data compares structurally.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    Module(Arc<Module>),
    Spec(Arc<ModuleSpec>),
    Loader(Arc<Loader>),
    Path(SearchLocations),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn str_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Value::List(Arc::new(items.into_iter().map(Value::str).collect()))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&Arc<Module>> {
        match self {
            Value::Module(m) => Some(m),
            _ => None,
        }
    }

    /// Interpret a list value as a list of strings, skipping other items.
    pub fn as_str_list(&self) -> Option<Vec<String>> {
        match self {
            Value::List(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Short type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Module(_) => "module",
            Value::Spec(_) => "spec",
            Value::Loader(_) => "loader",
            Value::Path(_) => "path",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Spec(a), Value::Spec(b)) => Arc::ptr_eq(a, b),
            (Value::Loader(a), Value::Loader(b)) => Arc::ptr_eq(a, b),
            (Value::Path(a), Value::Path(b)) => a.same_object(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Module(m) => write!(f, "<module '{}'>", m.name()),
            Value::Spec(s) => write!(f, "<spec '{}'>", s.name()),
            Value::Loader(l) => write!(f, "<loader {}>", l.kind()),
            Value::Path(p) => write!(f, "{:?}", p),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            other => write!(f, "{:?}", other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Arc<Module>> for Value {
    fn from(m: Arc<Module>) -> Self {
        Value::Module(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        assert_eq!(Value::from(3i64), Value::Int(3));
        assert_eq!(Value::str("a"), Value::from("a"));
        assert_ne!(Value::str("1"), Value::Int(1));
        assert_eq!(Value::str_list(["a", "b"]), Value::str_list(["a", "b"]));
    }

    #[test]
    fn test_module_identity_equality() {
        let a = Arc::new(Module::new("m"));
        let b = Arc::new(Module::new("m"));
        assert_eq!(Value::Module(a.clone()), Value::Module(a));
        assert_ne!(Value::Module(b), Value::Module(Arc::new(Module::new("m"))));
    }

    #[test]
    fn test_as_str_list_skips_non_strings() {
        let v = Value::List(Arc::new(vec![Value::str("x"), Value::Int(1), Value::str("y")]));
        assert_eq!(v.as_str_list(), Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(Value::Int(1).as_str_list(), None);
    }
}
