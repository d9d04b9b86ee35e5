/// modrt - Module-Loading Runtime
///
/// This library turns dotted module names into initialized, cached modules.
/// It coordinates concurrent imports of the same name, detects cross-thread
/// import deadlocks, and reuses compiled artifacts while they are still
/// valid.
///
/// # Architecture
///
/// An import request flows through the runtime in this order:
///
/// 1. **Registry fast path** (`runtime::ModuleRegistry`)
///    - Already-loaded modules are returned without locking
///
/// 2. **Module lock** (`runtime::LockRegistry`)
///    - One re-entrant lock per module name
///    - Waiting threads are recorded in a blocking-on graph; a wait that
///      would close a cycle fails fast with `DeadlockError`
///
/// 3. **Spec resolution** (`runtime::finder`)
///    - Builtin, frozen and path-based finders, in meta path order
///    - Per-directory `FileFinder`s with cached listings
///    - Namespace packages assembled across search-path entries
///
/// 4. **Load** (`runtime::loader`, `runtime::cache`)
///    - Module registered before execution (circular imports see the
///      partial module), rolled back if execution fails
///    - Source modules go through the compiled-artifact cache
///
/// # Example
///
/// ```rust,no_run
/// use modrt::runtime::{ImportSystem, RuntimeConfig};
///
/// let mut config = RuntimeConfig::default();
/// config.search_path.push("lib".into());
///
/// let sys = ImportSystem::new(config);
/// let module = sys.import_module("app.main", None).unwrap();
/// println!("{}", module);
/// ```
///
/// # Module Scripts
///
/// `script` provides the small language the default compiler and executor
/// understand:
///
/// - **Imports**: `import a.b`, `import a.b as x`, `from .sib import y, z as w`, `from m import *`
/// - **Assignments**: `name = 1 | "text" | true | none | [..] | other.name`
/// - **Errors**: `raise ValueError "message"`
pub mod runtime;
pub mod script;

pub use runtime::{ImportError, ImportResult, ImportSystem, Module, RuntimeConfig};
