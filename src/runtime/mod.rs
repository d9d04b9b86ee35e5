//! Module Runtime
//!
//! The machinery that turns a module name into an initialized module:
//! - `ImportSystem` - process-scoped state plus the import state machine
//! - `ModuleRegistry` - insertion-ordered name → module map
//! - `LockRegistry` / `ModuleLock` - per-name re-entrant locks with deadlock detection
//! - `ModuleSpec` - how to load one module, and attribute initialization
//! - `Loader` - source, compiled-only, builtin, frozen, extension and namespace loaders
//! - `MetaPathFinder` / `PathFinder` / `FileFinder` - name → spec resolution
//! - `ArtifactCache` - validated compiled-artifact cache
//! - `RuntimeConfig` - TOML + environment configuration

pub mod cache;
mod code;
mod config;
mod error;
pub mod finder;
mod fs;
mod importer;
pub mod loader;
mod lock;
mod module;
mod registry;
mod spec;
mod value;

pub use cache::{ArtifactCache, ArtifactHeader, HEADER_LEN, MAGIC_NUMBER};
pub use code::{decode_source, CodeObject, Compiler, Executor};
pub use config::{CheckHashPolicy, ConfigError, InvalidationMode, RuntimeConfig, DEFAULT_CACHE_TAG};
pub use error::{
    AttributeError, CacheError, CodeFormatError, CompileError, DeadlockError, Exception, ImportError,
    ImportResult, LockError,
};
pub use finder::{FileFinder, MetaPathFinder, NamespacePath, PathFinder, PathHook, SearchLocations};
pub use fs::{FileStat, FileSystem, OsFileSystem};
pub use importer::{resolve_name, ImportSystem, ImportSystemBuilder, WeakImportSystem};
pub use loader::{Loader, LoaderKind, NativeModule};
pub use lock::{LockRegistry, ModuleLock, ModuleLockGuard, ThreadToken};
pub use module::{attr, Module};
pub use registry::ModuleRegistry;
pub use spec::{
    init_module_attrs, module_from_spec, spec_from_file_location, spec_from_loader, LoaderState, ModuleSpec,
    PackageLocations,
};
pub use value::Value;
