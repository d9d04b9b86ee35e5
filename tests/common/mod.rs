//! Shared fixtures for integration tests: a temporary source tree plus
//! compiler/executor doubles that count calls.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use modrt::runtime::{
    CodeFormatError, CodeObject, CompileError, Compiler, Executor, FileStat, FileSystem, ImportResult,
    ImportSystem, Module, OsFileSystem, RuntimeConfig,
};
use modrt::script::{ScriptCompiler, ScriptExecutor};
use parking_lot::Mutex;
use tempfile::TempDir;

/// A temporary directory used as the only search-path entry.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        self.write_bytes(rel, contents.as_bytes())
    }

    pub fn write_bytes(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(&path).expect("create dir");
        path
    }

    pub fn config(&self) -> RuntimeConfig {
        RuntimeConfig {
            search_path: vec![self.root().to_path_buf()],
            ..RuntimeConfig::default()
        }
    }

    pub fn system(&self) -> ImportSystem {
        ImportSystem::new(self.config())
    }
}

/// `ScriptCompiler` that counts `compile` calls.
#[derive(Default)]
pub struct CountingCompiler {
    inner: ScriptCompiler,
    compiles: AtomicUsize,
}

impl CountingCompiler {
    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl Compiler for CountingCompiler {
    fn compile(&self, source: &str, filename: &str) -> Result<CodeObject, CompileError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(source, filename)
    }

    fn serialize(&self, code: &CodeObject) -> Result<Vec<u8>, CodeFormatError> {
        self.inner.serialize(code)
    }

    fn deserialize(&self, bytes: &[u8], filename: &str) -> Result<CodeObject, CodeFormatError> {
        self.inner.deserialize(bytes, filename)
    }
}

/// `ScriptExecutor` that records executions per module and can pause
/// before running each body.
#[derive(Default)]
pub struct CountingExecutor {
    inner: ScriptExecutor,
    runs: Mutex<HashMap<String, usize>>,
    order: Mutex<Vec<String>>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl CountingExecutor {
    pub fn with_delay(delay: Duration) -> Self {
        CountingExecutor {
            delay,
            ..Default::default()
        }
    }

    pub fn runs(&self, name: &str) -> usize {
        self.runs.lock().get(name).copied().unwrap_or(0)
    }

    /// Module names in the order their bodies started.
    pub fn order(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    /// Highest number of bodies seen running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Executor for CountingExecutor {
    fn execute(&self, code: &CodeObject, module: &Arc<Module>, sys: &ImportSystem) -> ImportResult<()> {
        *self.runs.lock().entry(module.name().to_string()).or_insert(0) += 1;
        self.order.lock().push(module.name().to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let result = self.inner.execute(code, module, sys);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// `OsFileSystem` whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FailingFs {
    inner: OsFileSystem,
    /// Error returned by every `write_bytes_atomic`.
    write_error: Option<io::ErrorKind>,
    /// Error returned by every `create_dir`.
    create_dir_error: Option<io::ErrorKind>,
    /// Create the directory, then report `AlreadyExists` once, as if
    /// another writer got there first.
    lose_first_create_race: bool,
    raced: AtomicBool,
    writes: AtomicUsize,
}

impl FailingFs {
    pub fn refusing(write_error: io::ErrorKind, create_dir_error: io::ErrorKind) -> Self {
        FailingFs {
            write_error: Some(write_error),
            create_dir_error: Some(create_dir_error),
            ..Default::default()
        }
    }

    pub fn losing_first_create_race() -> Self {
        FailingFs {
            lose_first_create_race: true,
            ..Default::default()
        }
    }

    /// Successful artifact writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl FileSystem for FailingFs {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.inner.stat(path)
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read_bytes(path)
    }

    fn write_bytes_atomic(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        if let Some(kind) = self.write_error {
            return Err(io::Error::new(kind, "write refused"));
        }
        self.inner.write_bytes_atomic(path, data, mode)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        self.inner.list_dir(path)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        if let Some(kind) = self.create_dir_error {
            return Err(io::Error::new(kind, "mkdir refused"));
        }
        if self.lose_first_create_race && !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.create_dir(path)?;
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "created concurrently"));
        }
        self.inner.create_dir(path)
    }
}

/// An import system with counting collaborators.
pub fn counting_system(
    config: RuntimeConfig,
    delay: Duration,
) -> (ImportSystem, Arc<CountingCompiler>, Arc<CountingExecutor>) {
    counting_system_with_fs(config, delay, Arc::new(OsFileSystem))
}

/// Like `counting_system`, over the given filesystem.
pub fn counting_system_with_fs(
    config: RuntimeConfig,
    delay: Duration,
    fs: Arc<dyn FileSystem>,
) -> (ImportSystem, Arc<CountingCompiler>, Arc<CountingExecutor>) {
    let compiler = Arc::new(CountingCompiler::default());
    let executor = Arc::new(CountingExecutor::with_delay(delay));
    let sys = ImportSystem::builder(config)
        .fs(fs)
        .compiler(compiler.clone())
        .executor(executor.clone())
        .build();
    (sys, compiler, executor)
}
