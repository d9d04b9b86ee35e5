//! Per-directory finder.
//!
//! A `FileFinder` answers "does this directory contain module `x`?" from a
//! cached listing of the directory. The listing is refreshed when the
//! directory's mtime changes or after an explicit `invalidate()`.
//!
//! For a tail name `x`, in order:
//!
//! 1. `x/<package_init><suffix>` for each loader suffix: a regular package.
//! 2. `x<suffix>` for each loader suffix: a plain module.
//! 3. A bare directory `x/`: a namespace portion (spec with no loader).
//!
//! Suffixes are tried extension first, then source, then compiled.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use super::SearchLocations;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::error::ImportResult;
use crate::runtime::loader::{ExtensionFileLoader, Loader, SourceFileLoader, SourcelessFileLoader};
use crate::runtime::spec::{spec_from_file_location, ModuleSpec, PackageLocations};
use crate::runtime::ImportSystem;

/// Which file loader a suffix maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Extension,
    Source,
    Compiled,
}

impl FileKind {
    fn loader(self, name: &str, path: &Path) -> Loader {
        match self {
            FileKind::Extension => Loader::Extension(ExtensionFileLoader::new(name, path)),
            FileKind::Source => Loader::Source(SourceFileLoader::new(name, path)),
            FileKind::Compiled => Loader::Sourceless(SourcelessFileLoader::new(name, path)),
        }
    }
}

/// Suffix table in lookup order.
pub fn loader_suffixes(config: &RuntimeConfig) -> Vec<(String, FileKind)> {
    let extensions = config.extension_suffixes.iter().map(|s| (s.clone(), FileKind::Extension));
    let sources = config.source_suffixes.iter().map(|s| (s.clone(), FileKind::Source));
    let compiled = config.compiled_suffixes.iter().map(|s| (s.clone(), FileKind::Compiled));
    extensions.chain(sources).chain(compiled).collect()
}

#[derive(Default)]
struct ListingCache {
    /// Directory mtime when `entries` was filled; `None` forces a refill.
    mtime: Option<Duration>,
    entries: HashSet<String>,
}

/// Finder for a single search-path directory.
pub struct FileFinder {
    path: PathBuf,
    suffixes: Vec<(String, FileKind)>,
    listing: Mutex<ListingCache>,
}

impl FileFinder {
    pub fn new(path: impl Into<PathBuf>, suffixes: Vec<(String, FileKind)>) -> Self {
        let path = path.into();
        let path = if path.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            path
        };
        Self {
            path,
            suffixes,
            listing: Mutex::new(ListingCache::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force the next lookup to re-list the directory.
    pub fn invalidate(&self) {
        self.listing.lock().mtime = None;
    }

    /// Snapshot of the cached listing, refreshed if the directory changed.
    fn listing(&self, sys: &ImportSystem) -> HashSet<String> {
        let mtime = sys.fs().stat(&self.path).ok().map(|st| st.modified);
        let mut cache = self.listing.lock();
        if cache.mtime.is_none() || cache.mtime != mtime {
            cache.entries = sys
                .fs()
                .list_dir(&self.path)
                .map(|names| names.into_iter().collect())
                .unwrap_or_default();
            cache.mtime = mtime;
            trace!(dir = %self.path.display(), entries = cache.entries.len(), "directory listing refreshed");
        }
        cache.entries.clone()
    }

    /// Spec for `fullname` within this directory.
    ///
    /// A directory with no initializer yields a spec with no loader whose
    /// search locations hold that directory, for the path finder to merge.
    pub fn find_spec(&self, fullname: &str, sys: &ImportSystem) -> ImportResult<Option<ModuleSpec>> {
        let tail = fullname.rsplit_once('.').map_or(fullname, |(_, tail)| tail);
        let entries = self.listing(sys);
        let fs = sys.fs();
        let package_init = &sys.config().package_init;

        let mut namespace_dir = None;
        if entries.contains(tail) {
            let base = self.path.join(tail);
            for (suffix, kind) in &self.suffixes {
                let init = base.join(format!("{}{}", package_init, suffix));
                if fs.is_file(&init) {
                    let locations = PackageLocations::Package(vec![base.to_string_lossy().into_owned()]);
                    return self.spec(fullname, &init, *kind, locations, sys).map(Some);
                }
            }
            if fs.is_dir(&base) {
                namespace_dir = Some(base);
            }
        }

        for (suffix, kind) in &self.suffixes {
            let file_name = format!("{}{}", tail, suffix);
            if !entries.contains(&file_name) {
                continue;
            }
            let full = self.path.join(&file_name);
            if fs.is_file(&full) {
                return self.spec(fullname, &full, *kind, PackageLocations::NotPackage, sys).map(Some);
            }
        }

        Ok(namespace_dir.map(|dir| {
            trace!(module = %fullname, dir = %dir.display(), "namespace portion");
            ModuleSpec::new(fullname, None).with_search_locations(SearchLocations::fixed([dir.to_string_lossy()]))
        }))
    }

    fn spec(
        &self,
        fullname: &str,
        path: &Path,
        kind: FileKind,
        locations: PackageLocations,
        sys: &ImportSystem,
    ) -> ImportResult<ModuleSpec> {
        trace!(module = %fullname, path = %path.display(), "file finder match");
        let loader = Arc::new(kind.loader(fullname, path));
        spec_from_file_location(fullname, path, loader, locations, sys)
    }
}

impl fmt::Debug for FileFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFinder").field("path", &self.path).finish()
    }
}
