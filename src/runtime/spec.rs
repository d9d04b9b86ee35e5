//! Module Specs
//!
//! A `ModuleSpec` records *how* to obtain and initialize a module: which
//! loader, where it came from, and (for packages) where its submodules live.
//! Finders create a fresh spec per load attempt; the import state machine
//! consumes it once and keeps it reachable as the module's `__spec__` for
//! reloads.
//!
//! Invariant: `search_locations().is_some()` iff the spec describes a
//! package.

use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::error::ImportResult;
use super::finder::SearchLocations;
use super::loader::{Loader, NamespaceLoader};
use super::module::{attr, Module};
use super::value::Value;
use super::ImportSystem;

/// Opaque loader-private data carried on a spec.
pub type LoaderState = Arc<dyn Any + Send + Sync>;

/// Describes how to load one module.
pub struct ModuleSpec {
    name: String,
    loader: RwLock<Option<Arc<Loader>>>,
    origin: RwLock<Option<String>>,
    loader_state: Option<LoaderState>,
    search_locations: RwLock<Option<SearchLocations>>,
    cached: RwLock<Option<String>>,
    /// Whether `origin` names a real filesystem location.
    has_location: bool,
    /// Set only while the state machine is executing the module.
    initializing: AtomicBool,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, loader: Option<Arc<Loader>>) -> Self {
        Self {
            name: name.into(),
            loader: RwLock::new(loader),
            origin: RwLock::new(None),
            loader_state: None,
            search_locations: RwLock::new(None),
            cached: RwLock::new(None),
            has_location: false,
            initializing: AtomicBool::new(false),
        }
    }

    pub fn with_origin(self, origin: impl Into<String>) -> Self {
        *self.origin.write() = Some(origin.into());
        self
    }

    /// Mark `origin` as a real filesystem path.
    pub fn with_location(mut self) -> Self {
        self.has_location = true;
        self
    }

    pub fn with_search_locations(self, locations: SearchLocations) -> Self {
        *self.search_locations.write() = Some(locations);
        self
    }

    pub fn with_cached(self, cached: Option<String>) -> Self {
        *self.cached.write() = cached;
        self
    }

    pub fn with_loader_state(mut self, state: LoaderState) -> Self {
        self.loader_state = Some(state);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loader(&self) -> Option<Arc<Loader>> {
        self.loader.read().clone()
    }

    pub fn set_loader(&self, loader: Option<Arc<Loader>>) {
        *self.loader.write() = loader;
    }

    pub fn origin(&self) -> Option<String> {
        self.origin.read().clone()
    }

    pub fn set_origin(&self, origin: Option<String>) {
        *self.origin.write() = origin;
    }

    pub fn loader_state(&self) -> Option<&LoaderState> {
        self.loader_state.as_ref()
    }

    pub fn search_locations(&self) -> Option<SearchLocations> {
        self.search_locations.read().clone()
    }

    pub fn set_search_locations(&self, locations: Option<SearchLocations>) {
        *self.search_locations.write() = locations;
    }

    pub fn is_package(&self) -> bool {
        self.search_locations.read().is_some()
    }

    /// Path of the compiled artifact for this module, if any.
    pub fn cached(&self) -> Option<String> {
        self.cached.read().clone()
    }

    pub fn set_cached(&self, cached: Option<String>) {
        *self.cached.write() = cached;
    }

    pub fn has_location(&self) -> bool {
        self.has_location
    }

    /// Package this module belongs to: itself for packages, otherwise the
    /// name up to the last dot (empty for top-level modules).
    pub fn parent(&self) -> &str {
        if self.is_package() {
            &self.name
        } else {
            self.name.rsplit_once('.').map_or("", |(parent, _)| parent)
        }
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }

    pub(crate) fn set_initializing(&self, value: bool) {
        self.initializing.store(value, Ordering::Release);
    }
}

impl PartialEq for ModuleSpec {
    fn eq(&self, other: &Self) -> bool {
        let same_loader = match (self.loader(), other.loader()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            (None, None) => true,
            _ => false,
        };
        let same_locations = match (self.search_locations(), other.search_locations()) {
            (Some(a), Some(b)) => a.entries() == b.entries(),
            (None, None) => true,
            _ => false,
        };
        self.name == other.name
            && same_loader
            && same_locations
            && self.origin() == other.origin()
            && self.cached() == other.cached()
            && self.has_location == other.has_location
    }
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ModuleSpec");
        s.field("name", &self.name)
            .field("loader", &self.loader().map(|l| l.kind()))
            .field("origin", &self.origin());
        if let Some(locations) = self.search_locations() {
            s.field("submodule_search_locations", &locations.entries());
        }
        s.finish()
    }
}

/// Package-ness passed to `spec_from_file_location`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageLocations {
    /// Ask the loader.
    Infer,
    /// A plain module.
    NotPackage,
    /// A package searching these locations (the file's directory if empty).
    Package(Vec<String>),
}

/// Build a spec from a loader, asking it for package-ness when unknown.
pub fn spec_from_loader(
    name: &str,
    loader: Arc<Loader>,
    origin: Option<String>,
    is_package: Option<bool>,
    sys: &ImportSystem,
) -> ImportResult<ModuleSpec> {
    let is_package = match is_package {
        Some(flag) => flag,
        None => loader.is_package(name, sys)?,
    };
    let mut spec = ModuleSpec::new(name, Some(loader));
    if let Some(origin) = origin {
        spec = spec.with_origin(origin);
    }
    if is_package {
        spec = spec.with_search_locations(SearchLocations::fixed(Vec::<String>::new()));
    }
    Ok(spec)
}

/// Build a spec for a module backed by a file.
pub fn spec_from_file_location(
    name: &str,
    location: &Path,
    loader: Arc<Loader>,
    locations: PackageLocations,
    sys: &ImportSystem,
) -> ImportResult<ModuleSpec> {
    let origin = location.to_string_lossy().into_owned();
    let entries = match locations {
        PackageLocations::Infer => {
            // A loader that cannot say is treated as a plain module.
            match loader.is_package(name, sys) {
                Ok(true) => Some(Vec::new()),
                _ => None,
            }
        }
        PackageLocations::NotPackage => None,
        PackageLocations::Package(entries) => Some(entries),
    };
    let cached = sys.artifact_cache().cached_for_origin(location);

    let mut spec = ModuleSpec::new(name, Some(loader))
        .with_origin(origin)
        .with_location()
        .with_cached(cached.map(|p| p.to_string_lossy().into_owned()));
    if let Some(mut entries) = entries {
        if entries.is_empty() {
            if let Some(dir) = location.parent() {
                entries.push(dir.to_string_lossy().into_owned());
            }
        }
        spec = spec.with_search_locations(SearchLocations::fixed(entries));
    }
    Ok(spec)
}

/// Copy spec data onto module attributes.
///
/// With `override_all`, every attribute is rewritten; otherwise only missing
/// (or `none`) attributes are filled in. `__spec__` is always set. A module
/// that refuses an attribute gets a warning and initialization continues.
pub fn init_module_attrs(spec: &Arc<ModuleSpec>, module: &Module, override_all: bool) {
    let set = |name: &str, value: Value| {
        if let Err(err) = module.set_attr(name, value) {
            warn!(module = %spec.name(), error = %err, "attribute not set during module init");
        }
    };
    let wants = |name: &str| override_all || module.attr_is_unset(name);

    if wants(attr::NAME) {
        set(attr::NAME, Value::str(spec.name()));
    }

    if wants(attr::LOADER) {
        let mut loader = spec.loader();
        if loader.is_none() {
            if let Some(locations) = spec.search_locations() {
                let synthesized = Arc::new(Loader::Namespace(NamespaceLoader::new(
                    spec.name(),
                    locations,
                )));
                spec.set_loader(Some(Arc::clone(&synthesized)));
                loader = Some(synthesized);
                // Namespace packages have no backing file.
                set(attr::FILE, Value::None);
            }
        }
        set(attr::LOADER, loader.map_or(Value::None, Value::Loader));
    }

    if wants(attr::PACKAGE) {
        set(attr::PACKAGE, Value::str(spec.parent()));
    }

    set(attr::SPEC, Value::Spec(Arc::clone(spec)));

    if wants(attr::PATH) {
        if let Some(locations) = spec.search_locations() {
            set(attr::PATH, Value::Path(locations));
        }
    }

    if spec.has_location() {
        if wants(attr::FILE) {
            if let Some(origin) = spec.origin() {
                set(attr::FILE, Value::str(origin));
            }
        }
        if wants(attr::CACHED) {
            if let Some(cached) = spec.cached() {
                set(attr::CACHED, Value::str(cached));
            }
        }
    }
}

/// Create a module for `spec` (letting the loader create it if it wants)
/// and initialize its attributes.
pub fn module_from_spec(spec: &Arc<ModuleSpec>, sys: &ImportSystem) -> ImportResult<Arc<Module>> {
    let created = match spec.loader() {
        Some(loader) => loader.create_module(spec, sys)?,
        None => None,
    };
    let module = created.unwrap_or_else(|| Arc::new(Module::new(spec.name())));
    init_module_attrs(spec, &module, false);
    Ok(module)
}
