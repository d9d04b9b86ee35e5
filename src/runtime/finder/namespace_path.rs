//! Live search path of a namespace package.
//!
//! A namespace package has no initializer of its own; its path is every
//! directory named after it on the parent's search path. That set changes
//! when the parent path is mutated or the filesystem changes, so the path is
//! recomputed on read whenever the parent path differs from the one last
//! used, or the namespace epoch (bumped by `invalidate_caches`) has moved.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{PathFinder, PathSearch};
use crate::runtime::importer::WeakImportSystem;
use crate::runtime::ImportSystem;

struct NamespaceState {
    path: Arc<Vec<String>>,
    last_parent: Arc<Vec<String>>,
    last_epoch: u64,
}

/// Lazily recomputed search path for a namespace package.
pub struct NamespacePath {
    name: String,
    sys: WeakImportSystem,
    state: Mutex<NamespaceState>,
}

impl NamespacePath {
    pub fn new(name: impl Into<String>, portions: Vec<String>, sys: &ImportSystem) -> Self {
        let name = name.into();
        let last_parent = parent_path(&name, sys).unwrap_or_default();
        Self {
            state: Mutex::new(NamespaceState {
                path: Arc::new(portions),
                last_parent,
                last_epoch: sys.namespace_epoch(),
            }),
            name,
            sys: sys.downgrade(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current entries, recomputed first if stale.
    pub fn entries(&self) -> Arc<Vec<String>> {
        let Some(sys) = self.sys.upgrade() else {
            return Arc::clone(&self.state.lock().path);
        };
        let Some(parent) = parent_path(&self.name, &sys) else {
            return Arc::clone(&self.state.lock().path);
        };
        let epoch = sys.namespace_epoch();
        {
            let state = self.state.lock();
            if state.last_epoch == epoch && *state.last_parent == *parent {
                return Arc::clone(&state.path);
            }
        }

        // Searched without holding the state lock; the search may read
        // other namespace paths.
        let recomputed = match PathFinder::search(&sys, &self.name, &parent) {
            Ok(PathSearch::Namespace(portions)) => Some(portions),
            Ok(_) => None,
            Err(err) => {
                warn!(package = %self.name, error = %err, "namespace path recomputation failed");
                None
            }
        };

        let mut state = self.state.lock();
        if let Some(portions) = recomputed {
            debug!(package = %self.name, entries = portions.len(), "namespace path recomputed");
            state.path = Arc::new(portions);
        }
        state.last_parent = parent;
        state.last_epoch = epoch;
        Arc::clone(&state.path)
    }

    /// Append an entry to the current path.
    pub fn append(&self, entry: impl Into<String>) {
        let mut state = self.state.lock();
        let mut path = (*state.path).clone();
        path.push(entry.into());
        state.path = Arc::new(path);
    }
}

/// Search path of the package containing `name` (the top-level search path
/// for top-level names). `None` when the parent is not loaded or is not a
/// package.
fn parent_path(name: &str, sys: &ImportSystem) -> Option<Arc<Vec<String>>> {
    match name.rsplit_once('.') {
        Some((parent, _)) => sys
            .modules()
            .get(parent)
            .and_then(|m| m.search_locations())
            .map(|locations| locations.entries()),
        None => Some(sys.search_path()),
    }
}

impl fmt::Debug for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespacePath")
            .field("name", &self.name)
            .field("path", &self.state.lock().path)
            .finish()
    }
}
