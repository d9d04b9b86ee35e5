//! Compiled-Artifact Cache
//!
//! Maps a source file to its compiled artifact, validates existing entries
//! and writes fresh ones. Caching is an optimization only: every rejection
//! (bad magic, truncation, stale timestamp or hash, undecodable payload)
//! falls back to compiling from source, and every write failure is logged
//! and dropped.
//!
//! # Path Mapping
//!
//! ```text
//! pkg/mod.mod  ->  pkg/__modcache__/mod.modrt-1.modc
//! ```
//!
//! With a `cache_prefix`, artifacts move into a parallel tree instead:
//! `<prefix>/<absolute source dir>/mod.modrt-1.modc`.

pub mod header;

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::code::{decode_source, CodeObject, Compiler};
use super::config::{CheckHashPolicy, InvalidationMode, RuntimeConfig};
use super::error::{CacheError, ImportError, ImportResult};
use super::fs::{FileStat, FileSystem};

pub use header::{ArtifactHeader, HEADER_LEN, MAGIC_NUMBER};

/// Outcome of probing an existing artifact.
enum Lookup {
    Hit(CodeObject),
    /// The entry was absent or rejected; `previous` is its header when one
    /// could be decoded, so a rewrite keeps the same validation mode.
    Miss { previous: Option<ArtifactHeader> },
}

/// Reads, validates and writes compiled artifacts.
pub struct ArtifactCache {
    fs: Arc<dyn FileSystem>,
    compiler: Arc<dyn Compiler>,
    tag: Option<String>,
    dir_name: String,
    prefix: Option<PathBuf>,
    source_suffixes: Vec<String>,
    compiled_suffixes: Vec<String>,
    check_hash_based: CheckHashPolicy,
    invalidation_mode: InvalidationMode,
    dont_write: AtomicBool,
}

impl ArtifactCache {
    pub fn new(config: &RuntimeConfig, fs: Arc<dyn FileSystem>, compiler: Arc<dyn Compiler>) -> Self {
        Self {
            fs,
            compiler,
            tag: config.cache_tag.clone(),
            dir_name: config.cache_dir_name.clone(),
            prefix: config.cache_prefix.clone(),
            source_suffixes: config.source_suffixes.clone(),
            compiled_suffixes: config.compiled_suffixes.clone(),
            check_hash_based: config.check_hash_based,
            invalidation_mode: config.invalidation_mode,
            dont_write: AtomicBool::new(config.dont_write_cache),
        }
    }

    pub fn dont_write(&self) -> bool {
        self.dont_write.load(Ordering::Relaxed)
    }

    /// Globally enable or disable artifact writes.
    pub fn set_dont_write(&self, value: bool) {
        self.dont_write.store(value, Ordering::Relaxed);
    }

    fn compiled_suffix(&self) -> &str {
        self.compiled_suffixes.first().map_or(".modc", String::as_str)
    }

    fn source_suffix(&self) -> &str {
        self.source_suffixes.first().map_or(".mod", String::as_str)
    }

    /// Artifact path for a source file, or `None` when caching is disabled
    /// (no cache tag) or the path has no file name.
    pub fn cache_from_source(&self, source: &Path) -> Option<PathBuf> {
        let tag = self.tag.as_deref()?;
        let file_name = source.file_name()?.to_str()?;
        let stem = match file_name.rsplit_once('.') {
            Some((base, _)) if !base.is_empty() => base,
            _ => file_name,
        };
        let artifact = format!("{}.{}{}", stem, tag, self.compiled_suffix());
        let head = source.parent().unwrap_or_else(|| Path::new(""));

        match &self.prefix {
            Some(prefix) => {
                let head = if head.is_absolute() {
                    head.to_path_buf()
                } else {
                    std::env::current_dir().ok()?.join(head)
                };
                let relative: PathBuf = head
                    .components()
                    .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
                    .collect();
                Some(prefix.join(relative).join(artifact))
            }
            None => Some(head.join(&self.dir_name).join(artifact)),
        }
    }

    /// Inverse of `cache_from_source`.
    pub fn source_from_cache(&self, path: &Path) -> Result<PathBuf, CacheError> {
        let malformed = |message: String| CacheError::Malformed {
            name: path.display().to_string(),
            message,
        };
        let tag = self
            .tag
            .as_deref()
            .ok_or_else(|| malformed("artifact caching is disabled".to_string()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| malformed("no file name".to_string()))?;
        let parent = path.parent().unwrap_or_else(|| Path::new(""));

        let head = match self.prefix.as_deref().and_then(|p| parent.strip_prefix(p).ok()) {
            Some(rest) => Path::new(MAIN_SEPARATOR_STR).join(rest),
            None => {
                if parent.file_name().and_then(|n| n.to_str()) != Some(self.dir_name.as_str()) {
                    return Err(malformed(format!("not inside a '{}' directory", self.dir_name)));
                }
                parent.parent().unwrap_or_else(|| Path::new("")).to_path_buf()
            }
        };

        let base = file_name
            .strip_suffix(self.compiled_suffix())
            .and_then(|rest| rest.strip_suffix(tag))
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(|| malformed(format!("expected '<name>.{}{}'", tag, self.compiled_suffix())))?;
        if base.is_empty() || base.contains('.') {
            return Err(malformed(format!("unexpected artifact name '{}'", file_name)));
        }
        Ok(head.join(format!("{}{}", base, self.source_suffix())))
    }

    /// The `cached` path for a module whose origin is `origin`.
    pub fn cached_for_origin(&self, origin: &Path) -> Option<PathBuf> {
        let text = origin.to_str()?;
        if self.source_suffixes.iter().any(|s| text.ends_with(s.as_str())) {
            self.cache_from_source(origin)
        } else if self.compiled_suffixes.iter().any(|s| text.ends_with(s.as_str())) {
            Some(origin.to_path_buf())
        } else {
            None
        }
    }

    /// Decode and compile source bytes.
    pub fn compile_source(&self, source: &[u8], filename: &str) -> ImportResult<CodeObject> {
        let text = decode_source(source, filename)?;
        Ok(self.compiler.compile(&text, filename)?)
    }

    /// Code for `source_path`, from a valid artifact if one exists, else
    /// compiled fresh (and cached unless writes are disabled).
    pub fn read_or_compile(&self, name: &str, source_path: &Path) -> ImportResult<CodeObject> {
        let filename = source_path.to_string_lossy();
        let stat = self
            .fs
            .stat(source_path)
            .map_err(|e| ImportError::io(source_path, &e))?;
        let cache_path = self.cache_from_source(source_path);

        let mut source_bytes = None;
        let previous = match &cache_path {
            Some(cache_path) => {
                match self.lookup(name, source_path, cache_path, &stat, &mut source_bytes)? {
                    Lookup::Hit(code) => return Ok(code),
                    Lookup::Miss { previous } => previous,
                }
            }
            None => None,
        };

        let source = match source_bytes {
            Some(bytes) => bytes,
            None => self
                .fs
                .read_bytes(source_path)
                .map_err(|e| ImportError::io(source_path, &e))?,
        };
        let code = self.compile_source(&source, &filename)?;
        debug!(module = %name, path = %filename, "compiled from source");

        if let Some(cache_path) = cache_path {
            if self.dont_write() {
                return Ok(code);
            }
            let header = match previous {
                Some(ArtifactHeader::Hash { check_source, .. }) => ArtifactHeader::hash(&source, check_source),
                Some(ArtifactHeader::Timestamp { .. }) => ArtifactHeader::timestamp(stat.mtime_secs(), stat.size),
                None => match self.invalidation_mode {
                    InvalidationMode::Timestamp => ArtifactHeader::timestamp(stat.mtime_secs(), stat.size),
                    InvalidationMode::CheckedHash => ArtifactHeader::hash(&source, true),
                    InvalidationMode::UncheckedHash => ArtifactHeader::hash(&source, false),
                },
            };
            match self.compiler.serialize(&code) {
                Ok(payload) => self.write_entry(&cache_path, &header.encode(&payload), stat.mode),
                Err(err) => debug!(module = %name, error = %err, "code object not cacheable"),
            }
        }
        Ok(code)
    }

    fn lookup(
        &self,
        name: &str,
        source_path: &Path,
        cache_path: &Path,
        stat: &FileStat,
        source_bytes: &mut Option<Vec<u8>>,
    ) -> ImportResult<Lookup> {
        let data = match self.fs.read_bytes(cache_path) {
            Ok(data) => data,
            Err(_) => return Ok(Lookup::Miss { previous: None }),
        };
        let (header, payload) = match header::classify(&data, name) {
            Ok(parts) => parts,
            Err(err) => {
                debug!(module = %name, path = %cache_path.display(), error = %err, "artifact rejected");
                return Ok(Lookup::Miss { previous: None });
            }
        };

        let verdict = match header {
            ArtifactHeader::Timestamp { .. } => {
                header::validate_timestamp(&header, stat.mtime_secs(), stat.size, name)
            }
            ArtifactHeader::Hash { check_source, .. } => {
                let must_check = match self.check_hash_based {
                    CheckHashPolicy::Never => false,
                    CheckHashPolicy::Always => true,
                    CheckHashPolicy::Default => check_source,
                };
                if must_check {
                    let source = self
                        .fs
                        .read_bytes(source_path)
                        .map_err(|e| ImportError::io(source_path, &e))?;
                    let verdict = header::validate_hash(&header, &source, name);
                    *source_bytes = Some(source);
                    verdict
                } else {
                    Ok(())
                }
            }
        };
        if let Err(err) = verdict {
            debug!(module = %name, path = %cache_path.display(), error = %err, "artifact rejected");
            return Ok(Lookup::Miss { previous: Some(header) });
        }

        match self.compiler.deserialize(payload, &source_path.to_string_lossy()) {
            Ok(code) => {
                debug!(module = %name, path = %cache_path.display(), "artifact hit");
                Ok(Lookup::Hit(code))
            }
            Err(err) => {
                debug!(module = %name, path = %cache_path.display(), error = %err, "artifact payload undecodable");
                Ok(Lookup::Miss { previous: Some(header) })
            }
        }
    }

    /// Code from a compiled-only file. There is no source to compare
    /// against, so only the header shape is checked; rejections surface as
    /// `ImportError`.
    pub fn load_compiled(&self, name: &str, path: &Path) -> ImportResult<CodeObject> {
        let data = self.fs.read_bytes(path).map_err(|e| ImportError::io(path, &e))?;
        let (_, payload) = header::classify(&data, name).map_err(|err| ImportError::import(name, err.to_string()))?;
        self.compiler
            .deserialize(payload, &path.to_string_lossy())
            .map_err(|err| ImportError::import(name, err.to_string()))
    }

    /// Best-effort write of an artifact, creating its directory chain.
    fn write_entry(&self, path: &Path, data: &[u8], source_mode: u32) {
        let mode = (source_mode | 0o200) & 0o666;
        if let Some(parent) = path.parent() {
            let mut missing = Vec::new();
            let mut dir = parent;
            while !dir.as_os_str().is_empty() && !self.fs.is_dir(dir) {
                missing.push(dir);
                match dir.parent() {
                    Some(up) => dir = up,
                    None => break,
                }
            }
            for dir in missing.iter().rev() {
                match self.fs.create_dir(dir) {
                    Ok(()) => {}
                    // Another writer got there first.
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                    Err(err) => {
                        log_write_failure(dir, &err);
                        return;
                    }
                }
            }
        }
        match self.fs.write_bytes_atomic(path, data, mode) {
            Ok(()) => debug!(path = %path.display(), "artifact written"),
            Err(err) => log_write_failure(path, &err),
        }
    }
}

fn log_write_failure(path: &Path, err: &io::Error) {
    if err.kind() == io::ErrorKind::PermissionDenied {
        debug!(path = %path.display(), error = %err, "artifact not written");
    } else {
        warn!(path = %path.display(), error = %err, "artifact not written");
    }
}

impl fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("tag", &self.tag)
            .field("dir_name", &self.dir_name)
            .field("prefix", &self.prefix)
            .field("dont_write", &self.dont_write())
            .finish()
    }
}
