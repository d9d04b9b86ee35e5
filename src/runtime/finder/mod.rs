//! Finders
//!
//! Finders turn a module name into a [`ModuleSpec`]. The import system asks
//! each entry of its meta path in turn:
//!
//! - **Builtin**: modules registered in the builtin registry.
//! - **Frozen**: modules whose source is embedded in the frozen registry.
//! - **Path**: walks a search path (the top-level one, or a parent
//!   package's `__path__`), asking a per-entry [`FileFinder`] for each.
//!
//! # Path Entries
//!
//! A search-path entry becomes a finder through the path hooks; the result,
//! including "no hook accepted this entry", is memoized in the path importer
//! cache until `invalidate_caches`.
//!
//! # Namespace Packages
//!
//! Directory matches without an initializer are remembered while the walk
//! continues. If no entry yields a concrete module, every remembered
//! directory becomes one namespace package whose path is a live
//! [`NamespacePath`].

mod file_finder;
mod namespace_path;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

pub use file_finder::{loader_suffixes, FileFinder, FileKind};
pub use namespace_path::NamespacePath;

use super::error::ImportResult;
use super::loader::{BuiltinLoader, FrozenLoader, Loader};
use super::spec::{spec_from_loader, ModuleSpec};
use super::ImportSystem;

/// A package's `__path__`: either a plain list or a live namespace path.
#[derive(Clone)]
pub enum SearchLocations {
    Static(Arc<RwLock<Vec<String>>>),
    Namespace(Arc<NamespacePath>),
}

impl SearchLocations {
    pub fn fixed<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SearchLocations::Static(Arc::new(RwLock::new(entries.into_iter().map(Into::into).collect())))
    }

    /// Current entries.
    pub fn entries(&self) -> Arc<Vec<String>> {
        match self {
            SearchLocations::Static(list) => Arc::new(list.read().clone()),
            SearchLocations::Namespace(ns) => ns.entries(),
        }
    }

    pub fn append(&self, entry: impl Into<String>) {
        match self {
            SearchLocations::Static(list) => list.write().push(entry.into()),
            SearchLocations::Namespace(ns) => ns.append(entry),
        }
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self, SearchLocations::Namespace(_))
    }

    /// Identity comparison.
    pub fn same_object(&self, other: &SearchLocations) -> bool {
        match (self, other) {
            (SearchLocations::Static(a), SearchLocations::Static(b)) => Arc::ptr_eq(a, b),
            (SearchLocations::Namespace(a), SearchLocations::Namespace(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for SearchLocations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchLocations::Static(list) => f.debug_list().entries(list.read().iter()).finish(),
            SearchLocations::Namespace(ns) => write!(f, "NamespacePath({:?})", ns.entries()),
        }
    }
}

/// Turns a search-path entry into a finder, or declines with `None`.
pub type PathHook = Arc<dyn Fn(&ImportSystem, &str) -> Option<Arc<FileFinder>> + Send + Sync>;

/// The default hook: a `FileFinder` for any entry that is a directory.
pub fn file_finder_hook() -> PathHook {
    Arc::new(|sys: &ImportSystem, entry: &str| {
        let dir = if entry.is_empty() { "." } else { entry };
        if !sys.fs().is_dir(std::path::Path::new(dir)) {
            return None;
        }
        Some(Arc::new(FileFinder::new(dir, loader_suffixes(sys.config()))))
    })
}

/// Entries of the meta path, asked in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaPathFinder {
    Builtin,
    Frozen,
    Path,
}

impl MetaPathFinder {
    /// The default meta path.
    pub fn defaults() -> Vec<MetaPathFinder> {
        vec![MetaPathFinder::Builtin, MetaPathFinder::Frozen, MetaPathFinder::Path]
    }

    /// `path` is the parent package's search path, `None` for top-level
    /// names.
    pub fn find_spec(&self, name: &str, path: Option<&[String]>, sys: &ImportSystem) -> ImportResult<Option<ModuleSpec>> {
        match self {
            MetaPathFinder::Builtin => {
                if !sys.builtins().contains(name) {
                    return Ok(None);
                }
                let loader = Arc::new(Loader::Builtin(BuiltinLoader));
                spec_from_loader(name, loader, Some("built-in".to_string()), Some(false), sys).map(Some)
            }
            MetaPathFinder::Frozen => {
                let Some(frozen) = sys.frozen().get(name) else {
                    return Ok(None);
                };
                let loader = Arc::new(Loader::Frozen(FrozenLoader));
                spec_from_loader(name, loader, Some("frozen".to_string()), Some(frozen.is_package), sys).map(Some)
            }
            MetaPathFinder::Path => PathFinder::find_spec(sys, name, path),
        }
    }

    pub fn invalidate_caches(&self, sys: &ImportSystem) {
        if let MetaPathFinder::Path = self {
            PathFinder::invalidate_caches(sys);
        }
    }
}

/// Result of walking a search path.
#[derive(Debug)]
pub enum PathSearch {
    Found(ModuleSpec),
    Namespace(Vec<String>),
    NotFound,
}

/// Finder over search-path entries.
pub struct PathFinder;

impl PathFinder {
    pub fn find_spec(sys: &ImportSystem, name: &str, path: Option<&[String]>) -> ImportResult<Option<ModuleSpec>> {
        let top_level;
        let path = match path {
            Some(path) => path,
            None => {
                top_level = sys.search_path();
                top_level.as_slice()
            }
        };
        match Self::search(sys, name, path)? {
            PathSearch::Found(spec) => Ok(Some(spec)),
            PathSearch::Namespace(portions) => {
                debug!(module = %name, portions = portions.len(), "namespace package");
                let live = NamespacePath::new(name, portions, sys);
                Ok(Some(
                    ModuleSpec::new(name, None).with_search_locations(SearchLocations::Namespace(Arc::new(live))),
                ))
            }
            PathSearch::NotFound => Ok(None),
        }
    }

    /// Walk `path`, returning the first concrete module, else the merged
    /// namespace portions.
    pub fn search(sys: &ImportSystem, name: &str, path: &[String]) -> ImportResult<PathSearch> {
        let mut portions = Vec::new();
        for entry in path {
            let Some(finder) = Self::importer(sys, entry) else {
                continue;
            };
            let Some(spec) = finder.find_spec(name, sys)? else {
                continue;
            };
            if spec.loader().is_some() {
                return Ok(PathSearch::Found(spec));
            }
            if let Some(locations) = spec.search_locations() {
                portions.extend(locations.entries().iter().cloned());
            }
        }
        if portions.is_empty() {
            Ok(PathSearch::NotFound)
        } else {
            Ok(PathSearch::Namespace(portions))
        }
    }

    /// Finder for a search-path entry, memoized in the path importer cache.
    pub fn importer(sys: &ImportSystem, entry: &str) -> Option<Arc<FileFinder>> {
        if let Some(cached) = sys.path_importer_cache().lock().get(entry) {
            return cached.clone();
        }
        let finder = sys.path_hooks().iter().find_map(|hook| hook(sys, entry));
        trace!(entry = %entry, found = finder.is_some(), "path importer cache miss");
        sys.path_importer_cache()
            .lock()
            .entry(entry.to_string())
            .or_insert(finder)
            .clone()
    }

    /// Drop negative and relative cache entries, invalidate every remaining
    /// finder's listing, and advance the namespace epoch.
    pub fn invalidate_caches(sys: &ImportSystem) {
        let mut cache = sys.path_importer_cache().lock();
        cache.retain(|entry, finder| match finder {
            Some(finder) if std::path::Path::new(entry).is_absolute() => {
                finder.invalidate();
                true
            }
            _ => false,
        });
        drop(cache);
        sys.bump_namespace_epoch();
    }
}
