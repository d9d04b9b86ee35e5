//! Import System
//!
//! `ImportSystem` is the process-scoped state of the module runtime (module
//! registry, lock registry, search path, meta path, path importer cache,
//! artifact cache and the module registries) behind a cheap cloneable
//! handle, plus the import state machine that drives it.
//!
//! # State Machine
//!
//! ```text
//! NOT_LOADED ─▶ SPEC_RESOLVED ─▶ LOCK_HELD ─▶ MODULE_CREATED ─▶ REGISTERED ─▶ EXECUTING ─▶ COMPLETE
//!                                    │               │               │              │
//!                                    └───────────────┴───────┬───────┴──────────────┘
//!                                                            ▼
//!                                                   FAILED (rollback)
//! ```
//!
//! A module is registered *before* its body executes, so a circular import
//! observes the partially built module instead of recursing. If execution
//! fails the registry entry is removed and the original error is returned
//! unchanged. The module lock is released on every path by its guard.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::cache::ArtifactCache;
use super::code::{Compiler, Executor};
use super::config::RuntimeConfig;
use super::error::{ImportError, ImportResult};
use super::finder::{file_finder_hook, FileFinder, MetaPathFinder, PathHook};
use super::fs::{FileSystem, OsFileSystem};
use super::loader::{BuiltinRegistry, FrozenRegistry, NativeRegistry};
use super::lock::LockRegistry;
use super::module::{attr, Module};
use super::registry::ModuleRegistry;
use super::spec::{init_module_attrs, module_from_spec, ModuleSpec};
use super::value::Value;
use crate::script::{ScriptCompiler, ScriptExecutor};

type ImporterCache = Mutex<HashMap<String, Option<Arc<FileFinder>>>>;

struct SystemState {
    config: RuntimeConfig,
    modules: ModuleRegistry,
    locks: LockRegistry,
    search_path: RwLock<Arc<Vec<String>>>,
    meta_path: RwLock<Vec<MetaPathFinder>>,
    path_hooks: RwLock<Vec<PathHook>>,
    path_importer_cache: ImporterCache,
    namespace_epoch: AtomicU64,
    cache: ArtifactCache,
    fs: Arc<dyn FileSystem>,
    compiler: Arc<dyn Compiler>,
    executor: Arc<dyn Executor>,
    builtins: BuiltinRegistry,
    frozen: FrozenRegistry,
    natives: NativeRegistry,
    /// Modules currently being reloaded, for re-entrant `reload`.
    reloading: Mutex<HashMap<String, Arc<Module>>>,
}

/// Handle to a module runtime. Clones share the same state.
#[derive(Clone)]
pub struct ImportSystem {
    state: Arc<SystemState>,
}

/// Non-owning handle, held by objects the system itself owns.
#[derive(Clone)]
pub struct WeakImportSystem {
    state: Weak<SystemState>,
}

impl WeakImportSystem {
    pub fn upgrade(&self) -> Option<ImportSystem> {
        self.state.upgrade().map(|state| ImportSystem { state })
    }
}

/// Builder for [`ImportSystem`].
pub struct ImportSystemBuilder {
    config: RuntimeConfig,
    fs: Option<Arc<dyn FileSystem>>,
    compiler: Option<Arc<dyn Compiler>>,
    executor: Option<Arc<dyn Executor>>,
    meta_path: Vec<MetaPathFinder>,
    path_hooks: Vec<PathHook>,
}

impl ImportSystemBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            fs: None,
            compiler: None,
            executor: None,
            meta_path: MetaPathFinder::defaults(),
            path_hooks: vec![file_finder_hook()],
        }
    }

    pub fn fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn meta_path(mut self, meta_path: Vec<MetaPathFinder>) -> Self {
        self.meta_path = meta_path;
        self
    }

    /// Add a path hook ahead of the default file finder hook.
    pub fn path_hook(mut self, hook: PathHook) -> Self {
        self.path_hooks.insert(self.path_hooks.len().saturating_sub(1), hook);
        self
    }

    pub fn build(self) -> ImportSystem {
        let fs = self.fs.unwrap_or_else(|| Arc::new(OsFileSystem));
        let compiler = self.compiler.unwrap_or_else(|| Arc::new(ScriptCompiler::new()));
        let executor = self.executor.unwrap_or_else(|| Arc::new(ScriptExecutor::new()));
        let cache = ArtifactCache::new(&self.config, Arc::clone(&fs), Arc::clone(&compiler));
        let search_path = Arc::new(self.config.search_path_entries());
        ImportSystem {
            state: Arc::new(SystemState {
                modules: ModuleRegistry::new(),
                locks: LockRegistry::new(),
                search_path: RwLock::new(search_path),
                meta_path: RwLock::new(self.meta_path),
                path_hooks: RwLock::new(self.path_hooks),
                path_importer_cache: Mutex::new(HashMap::new()),
                namespace_epoch: AtomicU64::new(1),
                cache,
                fs,
                compiler,
                executor,
                builtins: BuiltinRegistry::new(),
                frozen: FrozenRegistry::new(),
                natives: NativeRegistry::new(),
                reloading: Mutex::new(HashMap::new()),
                config: self.config,
            }),
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ImportSystem {
    pub fn new(config: RuntimeConfig) -> Self {
        ImportSystemBuilder::new(config).build()
    }

    pub fn builder(config: RuntimeConfig) -> ImportSystemBuilder {
        ImportSystemBuilder::new(config)
    }

    pub fn downgrade(&self) -> WeakImportSystem {
        WeakImportSystem {
            state: Arc::downgrade(&self.state),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.state.config
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.state.modules
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.state.locks
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.state.fs
    }

    pub fn compiler(&self) -> &Arc<dyn Compiler> {
        &self.state.compiler
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.state.executor
    }

    pub fn artifact_cache(&self) -> &ArtifactCache {
        &self.state.cache
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.state.builtins
    }

    pub fn frozen(&self) -> &FrozenRegistry {
        &self.state.frozen
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.state.natives
    }

    /// The top-level search path.
    pub fn search_path(&self) -> Arc<Vec<String>> {
        Arc::clone(&*self.state.search_path.read())
    }

    pub fn set_search_path(&self, entries: Vec<String>) {
        *self.state.search_path.write() = Arc::new(entries);
    }

    pub fn push_search_path(&self, entry: impl Into<String>) {
        let mut path = self.state.search_path.write();
        let mut entries = (**path).clone();
        entries.push(entry.into());
        *path = Arc::new(entries);
    }

    pub fn meta_path(&self) -> Vec<MetaPathFinder> {
        self.state.meta_path.read().clone()
    }

    pub fn set_meta_path(&self, meta_path: Vec<MetaPathFinder>) {
        *self.state.meta_path.write() = meta_path;
    }

    pub fn path_hooks(&self) -> Vec<PathHook> {
        self.state.path_hooks.read().clone()
    }

    pub(crate) fn path_importer_cache(&self) -> &ImporterCache {
        &self.state.path_importer_cache
    }

    pub fn namespace_epoch(&self) -> u64 {
        self.state.namespace_epoch.load(Ordering::Acquire)
    }

    pub(crate) fn bump_namespace_epoch(&self) {
        self.state.namespace_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// A loaded (or loading) module.
    pub fn module(&self, name: &str) -> Option<Arc<Module>> {
        self.state.modules.get(name)
    }
}

// ============================================================================
// Name Resolution
// ============================================================================

/// Resolve a relative `name` (with its leading dots already stripped) of
/// the given `level` against `package`.
fn resolve_relative(name: &str, package: &str, level: usize) -> ImportResult<String> {
    let bits: Vec<&str> = package.rsplitn(level, '.').collect();
    if bits.len() < level {
        return Err(ImportError::Import {
            name: None,
            message: "attempted relative import beyond top-level package".to_string(),
        });
    }
    let base = bits[bits.len() - 1];
    if name.is_empty() {
        Ok(base.to_string())
    } else {
        Ok(format!("{}.{}", base, name))
    }
}

/// Resolve a possibly relative module name to an absolute one.
pub fn resolve_name(name: &str, package: Option<&str>) -> ImportResult<String> {
    if !name.starts_with('.') {
        return Ok(name.to_string());
    }
    let package = package.filter(|p| !p.is_empty()).ok_or_else(|| {
        ImportError::InvalidName(format!(
            "no package specified for '{}' (required for relative module names)",
            name
        ))
    })?;
    let level = name.len() - name.trim_start_matches('.').len();
    resolve_relative(&name[level..], package, level)
}

fn sanity_check(name: &str, package: Option<&str>, level: usize) -> ImportResult<()> {
    if level > 0 && package.map_or(true, str::is_empty) {
        return Err(ImportError::Import {
            name: None,
            message: "attempted relative import with no known parent package".to_string(),
        });
    }
    if name.is_empty() && level == 0 {
        return Err(ImportError::InvalidName("Empty module name".to_string()));
    }
    Ok(())
}

/// Package an importing module's relative imports resolve against:
/// `__package__`, falling back to the spec's parent, then to the name.
fn calc_package(importer: &Module) -> Option<String> {
    let package = importer.package();
    let spec = importer.spec();
    if let Some(package) = package {
        if let Some(spec) = &spec {
            if spec.parent() != package {
                warn!(module = %importer.name(), package = %package, parent = %spec.parent(), "__package__ != __spec__.parent");
            }
        }
        return Some(package);
    }
    if let Some(spec) = spec {
        return Some(spec.parent().to_string());
    }
    warn!(module = %importer.name(), "can't resolve package from __spec__ or __package__, falling back on __name__ and __path__");
    let name = importer.name();
    if importer.is_package() {
        Some(name.to_string())
    } else {
        Some(name.rsplit_once('.').map_or("", |(parent, _)| parent).to_string())
    }
}

// ============================================================================
// Import State Machine
// ============================================================================

impl ImportSystem {
    /// Import `name`, which may be relative when `package` is given.
    /// Returns the named module itself.
    pub fn import_module(&self, name: &str, package: Option<&str>) -> ImportResult<Arc<Module>> {
        let level = name.len() - name.trim_start_matches('.').len();
        if level > 0 && package.is_none() {
            return Err(ImportError::InvalidName(format!(
                "the 'package' argument is required to perform a relative import for '{}'",
                name
            )));
        }
        self.gcd_import(&name[level..], package, level)
    }

    /// Import an absolute name, or a relative one of the given `level`.
    pub fn gcd_import(&self, name: &str, package: Option<&str>, level: usize) -> ImportResult<Arc<Module>> {
        sanity_check(name, package, level)?;
        match (level, package) {
            (0, _) | (_, None) => self.find_and_load(name),
            (level, Some(package)) => self.find_and_load(&resolve_relative(name, package, level)?),
        }
    }

    /// The import statement's entry point.
    ///
    /// With an empty `fromlist` the *top-level* package of `name` is
    /// returned (what `import a.b.c` binds); otherwise the named module
    /// itself, with any `fromlist` submodules imported.
    pub fn import(
        &self,
        name: &str,
        importer: Option<&Module>,
        fromlist: &[String],
        level: usize,
    ) -> ImportResult<Arc<Module>> {
        let module = if level == 0 {
            self.gcd_import(name, None, 0)?
        } else {
            let package = importer.and_then(calc_package);
            self.gcd_import(name, package.as_deref(), level)?
        };

        if fromlist.is_empty() {
            if level == 0 {
                let top = name.split_once('.').map_or(name, |(top, _)| top);
                return self.gcd_import(top, None, 0);
            }
            if name.is_empty() {
                return Ok(module);
            }
            let cut_off = name.len() - name.split_once('.').map_or(name, |(top, _)| top).len();
            let full = module.name();
            let top = full
                .len()
                .checked_sub(cut_off)
                .and_then(|end| full.get(..end))
                .ok_or_else(|| {
                    ImportError::import(
                        name,
                        format!("module '{}' is too short to contain '{}'", full, name),
                    )
                })?;
            return self
                .modules()
                .get(top)
                .ok_or_else(|| ImportError::not_found(top));
        }

        if module.is_package() {
            self.handle_fromlist(&module, fromlist)
        } else {
            Ok(module)
        }
    }

    /// Import the submodules named in `fromlist` that are not already
    /// attributes of `module`. `*` expands through `__all__`.
    pub fn handle_fromlist(&self, module: &Arc<Module>, fromlist: &[String]) -> ImportResult<Arc<Module>> {
        self.handle_fromlist_inner(module, fromlist, false)?;
        Ok(Arc::clone(module))
    }

    fn handle_fromlist_inner(&self, module: &Arc<Module>, fromlist: &[String], recursive: bool) -> ImportResult<()> {
        for item in fromlist {
            if item == "*" {
                if !recursive {
                    if let Some(all) = module.get_attr(attr::ALL).and_then(|v| v.as_str_list()) {
                        self.handle_fromlist_inner(module, &all, true)?;
                    }
                }
                continue;
            }
            if module.has_attr(item) {
                continue;
            }
            let from_name = format!("{}.{}", module.name(), item);
            match self.gcd_import(&from_name, None, 0) {
                Ok(_) => {}
                // A missing submodule leaves the attribute lookup to fail
                // with the better message.
                Err(err) if err.is_not_found() && err.name() == Some(from_name.as_str()) => {
                    trace!(module = %from_name, "fromlist entry not found");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Return the module for `name`, loading it if necessary.
    pub fn find_and_load(&self, name: &str) -> ImportResult<Arc<Module>> {
        loop {
            match self.modules().get(name) {
                Some(module) if !module.is_initializing() => return Ok(module),
                Some(_) => {
                    trace!(module = %name, "waiting for in-progress import");
                    self.locks().lock_unlock(name);
                    // Absent now means the other import failed; try ourselves.
                    if let Some(module) = self.modules().get(name) {
                        return Ok(module);
                    }
                }
                None => {
                    let _guard = self.locks().acquire(name)?;
                    trace!(module = %name, "module lock held");
                    if let Some(module) = self.modules().get(name) {
                        return Ok(module);
                    }
                    return self.find_and_load_unlocked(name);
                }
            }
        }
    }

    fn find_and_load_unlocked(&self, name: &str) -> ImportResult<Arc<Module>> {
        let mut parent_binding = None;
        let mut path = None;

        if let Some((parent, child)) = name.rsplit_once('.') {
            if !self.modules().contains(parent) {
                self.find_and_load(parent)?;
            }
            // Importing the parent may have imported this module too.
            if let Some(module) = self.modules().get(name) {
                return Ok(module);
            }
            let parent_module = self.modules().get(parent).ok_or_else(|| {
                ImportError::not_found_with(name, format!("No module named '{}'; '{}' was removed", name, parent))
            })?;
            let locations = parent_module.search_locations().ok_or_else(|| {
                ImportError::not_found_with(name, format!("No module named '{}'; '{}' is not a package", name, parent))
            })?;
            path = Some(locations.entries());
            parent_binding = Some((parent_module, child));
        }

        let spec = self
            .find_spec_on_meta_path(name, path.as_deref().map(Vec::as_slice))?
            .ok_or_else(|| ImportError::not_found(name))?;
        trace!(module = %name, "spec resolved");
        let module = self.load_unlocked(spec)?;

        if let Some((parent_module, child)) = parent_binding {
            if let Err(err) = parent_module.set_attr(child, Value::Module(Arc::clone(&module))) {
                warn!(
                    parent = %parent_module.name(),
                    child = %child,
                    error = %err,
                    "cannot bind submodule on parent"
                );
            }
        }
        Ok(module)
    }

    /// Ask each meta path finder for a spec.
    fn find_spec_on_meta_path(&self, name: &str, path: Option<&[String]>) -> ImportResult<Option<Arc<ModuleSpec>>> {
        let meta_path = self.meta_path();
        if meta_path.is_empty() {
            warn!(module = %name, "meta path is empty; nothing can be imported");
        }
        let is_reload = self.modules().contains(name);
        for finder in &meta_path {
            let Some(spec) = finder.find_spec(name, path, self)? else {
                continue;
            };
            // A concurrent or nested import may have finished this module
            // while we searched; keep its spec.
            if !is_reload {
                if let Some(existing) = self.modules().get(name).and_then(|m| m.spec()) {
                    return Ok(Some(existing));
                }
            }
            return Ok(Some(Arc::new(spec)));
        }
        Ok(None)
    }

    fn load_unlocked(&self, spec: Arc<ModuleSpec>) -> ImportResult<Arc<Module>> {
        let module = module_from_spec(&spec, self)?;
        trace!(module = %spec.name(), "module created");
        spec.set_initializing(true);
        let result = self.register_and_exec(&spec, module);
        spec.set_initializing(false);
        result
    }

    fn register_and_exec(&self, spec: &Arc<ModuleSpec>, module: Arc<Module>) -> ImportResult<Arc<Module>> {
        let name = spec.name();
        self.modules().insert(name, Arc::clone(&module));
        trace!(module = %name, "registered; executing");

        let outcome = match spec.loader() {
            Some(loader) => loader.exec_module(&module, self),
            None if spec.is_package() => Ok(()),
            None => Err(ImportError::import(name, "missing loader")),
        };
        if let Err(err) = outcome {
            self.modules().remove(name);
            debug!(module = %name, error = %err, "import failed; registry entry rolled back");
            return Err(err);
        }

        // The body may have replaced its own registry entry; return that.
        let module = self
            .modules()
            .move_to_end(name)
            .ok_or_else(|| ImportError::import(name, format!("loaded module {} not found in registry", name)))?;
        debug!(module = %name, loader = ?spec.loader().map(|l| l.kind()), "imported");
        Ok(module)
    }

    // ========================================================================
    // Utilities
    // ========================================================================

    /// Spec for `name` without loading it. An already loaded module
    /// reports its own spec; otherwise the parent package is imported and
    /// its path searched.
    pub fn find_spec(&self, name: &str, package: Option<&str>) -> ImportResult<Option<Arc<ModuleSpec>>> {
        let fullname = resolve_name(name, package)?;
        if let Some(module) = self.modules().get(&fullname) {
            return module
                .spec()
                .map(Some)
                .ok_or_else(|| ImportError::import(fullname.as_str(), format!("{}.__spec__ is not set", fullname)));
        }
        let path = match fullname.rsplit_once('.') {
            Some((parent_name, _)) => {
                let parent = self.import(parent_name, None, &[attr::PATH.to_string()], 0)?;
                let locations = parent.search_locations().ok_or_else(|| {
                    ImportError::not_found_with(
                        fullname.as_str(),
                        format!(
                            "__path__ attribute not found on '{}' while trying to find '{}'",
                            parent_name, fullname
                        ),
                    )
                })?;
                Some(locations.entries())
            }
            None => None,
        };
        self.find_spec_on_meta_path(&fullname, path.as_deref().map(Vec::as_slice))
    }

    /// Re-execute an already loaded module in place.
    pub fn reload(&self, module: &Arc<Module>) -> ImportResult<Arc<Module>> {
        let name = module.spec().map_or_else(|| module.name().to_string(), |s| s.name().to_string());
        match self.modules().get(&name) {
            Some(current) if Arc::ptr_eq(&current, module) => {}
            _ => return Err(ImportError::import(name.as_str(), format!("module {} not in registry", name))),
        }

        {
            let mut reloading = self.state.reloading.lock();
            if let Some(in_progress) = reloading.get(&name) {
                return Ok(Arc::clone(in_progress));
            }
            reloading.insert(name.clone(), Arc::clone(module));
        }
        let result = self.reload_inner(&name, module);
        self.state.reloading.lock().remove(&name);
        result
    }

    fn reload_inner(&self, name: &str, module: &Arc<Module>) -> ImportResult<Arc<Module>> {
        let path = match name.rsplit_once('.') {
            Some((parent_name, _)) => {
                let parent = self.modules().get(parent_name).ok_or_else(|| {
                    ImportError::import(parent_name, format!("parent '{}' not in registry", parent_name))
                })?;
                parent.search_locations().map(|l| l.entries())
            }
            None => None,
        };
        let spec = self
            .find_spec_on_meta_path(name, path.as_deref().map(Vec::as_slice))?
            .ok_or_else(|| ImportError::not_found_with(name, format!("spec not found for the module '{}'", name)))?;
        self.exec_in_place(&spec, module)
    }

    fn exec_in_place(&self, spec: &Arc<ModuleSpec>, module: &Arc<Module>) -> ImportResult<Arc<Module>> {
        let name = spec.name();
        let _guard = self.locks().acquire(name)?;
        match self.modules().get(name) {
            Some(current) if Arc::ptr_eq(&current, module) => {}
            _ => return Err(ImportError::import(name, format!("module '{}' not in registry", name))),
        }

        let outcome = match spec.loader() {
            None if !spec.is_package() => Err(ImportError::import(name, "missing loader")),
            None => {
                init_module_attrs(spec, module, true);
                Ok(())
            }
            Some(loader) => {
                init_module_attrs(spec, module, true);
                loader.exec_module(module, self)
            }
        };
        let current = self.modules().move_to_end(name);
        outcome?;
        debug!(module = %name, "reloaded");
        current.ok_or_else(|| ImportError::import(name, format!("module '{}' not in registry", name)))
    }

    /// Ask every meta path finder to drop its caches. The path finder
    /// forgets negative and relative-path importer entries, invalidates the
    /// remaining directory listings and advances the namespace epoch.
    pub fn invalidate_caches(&self) {
        for finder in self.meta_path() {
            finder.invalidate_caches(self);
        }
        debug!(epoch = self.namespace_epoch(), "import caches invalidated");
    }

    /// Tear down every loaded module, most recently completed first.
    /// Each module's bindings are cleared, so modules kept alive only by
    /// circular imports are freed. Returns the names in teardown order.
    pub fn shutdown(&self) -> Vec<String> {
        let drained = self.modules().drain_for_shutdown();
        self.path_importer_cache().lock().clear();
        drained
            .into_iter()
            .map(|(name, module)| {
                trace!(module = %name, "tearing down");
                module.clear();
                name
            })
            .collect()
    }
}

impl fmt::Debug for ImportSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportSystem")
            .field("modules", &self.state.modules)
            .field("locks", &self.state.locks)
            .field("search_path", &self.search_path())
            .field("meta_path", &self.meta_path())
            .field("cache", &self.state.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_import_with_mismatched_registry_name_fails() {
        let sys = ImportSystem::new(RuntimeConfig::default());
        sys.modules().insert("pkg.sub.deep", Arc::new(Module::new("x")));
        let importer = Module::new("pkg.caller");

        let err = sys.import("sub.deep", Some(&importer), &[], 1).unwrap_err();
        assert!(matches!(err, ImportError::Import { .. }), "unexpected: {:?}", err);
    }

    #[test]
    fn test_resolve_name() {
        assert_eq!(resolve_name("a.b", None).unwrap(), "a.b");
        assert_eq!(resolve_name(".sib", Some("pkg.sub")).unwrap(), "pkg.sub.sib");
        assert_eq!(resolve_name("..up", Some("pkg.sub")).unwrap(), "pkg.up");
        assert_eq!(resolve_name(".", Some("pkg")).unwrap(), "pkg");
        assert!(resolve_name("...x", Some("pkg")).is_err());
        assert!(resolve_name(".x", None).is_err());
    }

    #[test]
    fn test_sanity_check() {
        assert!(sanity_check("", None, 0).is_err());
        assert!(sanity_check("x", None, 1).is_err());
        assert!(sanity_check("x", Some(""), 1).is_err());
        assert!(sanity_check("x", Some("pkg"), 1).is_ok());
    }

    #[test]
    fn test_calc_package_prefers_dunder_package() {
        let module = Module::new("pkg.mod");
        module.set_attr(attr::PACKAGE, Value::str("pkg")).unwrap();
        assert_eq!(calc_package(&module).as_deref(), Some("pkg"));

        let bare = Module::new("pkg.mod");
        assert_eq!(calc_package(&bare).as_deref(), Some("pkg"));
    }

    #[test]
    fn test_missing_module_is_not_found() {
        let sys = ImportSystem::new(RuntimeConfig::default());
        let err = sys.import_module("definitely_missing", None).unwrap_err();
        assert!(err.is_not_found());
        assert!(sys.module("definitely_missing").is_none());
    }

    #[test]
    fn test_builtin_module_import() {
        let sys = ImportSystem::new(RuntimeConfig::default());
        sys.builtins().register("answers", |m: &Module| {
            m.set_attr("value", Value::Int(42))
                .map_err(|e| crate::runtime::error::Exception::new("AttributeError", e.to_string()))
        });
        let module = sys.import_module("answers", None).unwrap();
        assert_eq!(module.get_attr("value"), Some(Value::Int(42)));
        assert_eq!(module.spec().unwrap().origin().as_deref(), Some("built-in"));
        assert!(Arc::ptr_eq(&sys.import_module("answers", None).unwrap(), &module));
    }

    #[test]
    fn test_frozen_package_and_submodule() {
        let sys = ImportSystem::new(RuntimeConfig::default());
        sys.frozen().register("bundle", "kind = \"package\"\n", true);
        sys.frozen().register("bundle.part", "kind = \"module\"\n", false);

        let part = sys.import_module("bundle.part", None).unwrap();
        let bundle = sys.module("bundle").unwrap();
        assert!(bundle.is_package());
        assert_eq!(part.get_attr("kind"), Some(Value::str("module")));
        assert!(matches!(bundle.get_attr("part"), Some(Value::Module(m)) if Arc::ptr_eq(&m, &part)));
    }

    #[test]
    fn test_relative_import_requires_package() {
        let sys = ImportSystem::new(RuntimeConfig::default());
        assert!(matches!(
            sys.import_module(".x", None),
            Err(ImportError::InvalidName(_))
        ));
    }
}
