//! Filesystem collaborator.
//!
//! The import machinery never touches `std::fs` directly; everything goes
//! through `FileSystem` so tests can substitute failing or counting doubles.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

/// The subset of `stat` the import machinery consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    /// Modification time since the Unix epoch (zero for earlier times).
    pub modified: Duration,
    pub size: u64,
    pub is_dir: bool,
    /// Permission bits (0o644 on platforms without them).
    pub mode: u32,
}

impl FileStat {
    /// Modification time truncated to whole seconds.
    pub fn mtime_secs(&self) -> u64 {
        self.modified.as_secs()
    }
}

/// Filesystem primitives used by finders, loaders and the artifact cache.
pub trait FileSystem: Send + Sync + fmt::Debug {
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write `data` so that readers observe either the old file or the
    /// complete new one, never a partial write.
    fn write_bytes_atomic(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Create a single directory. Fails with `AlreadyExists` if present.
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    fn is_file(&self, path: &Path) -> bool {
        self.stat(path).map_or(false, |st| !st.is_dir)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.stat(path).map_or(false, |st| st.is_dir)
    }
}

/// `FileSystem` backed by the host operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = fs::metadata(path)?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or(Duration::ZERO);
        Ok(FileStat {
            modified,
            size: meta.len(),
            is_dir: meta.is_dir(),
            mode: permission_bits(&meta),
        })
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_bytes_atomic(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        // The temp file unlinks itself on drop, so every early return cleans up.
        let mut tmp = tempfile::Builder::new()
            .prefix(".modrt-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        set_permission_bits(tmp.path(), mode)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
fn set_permission_bits(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_permission_bits(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let fs = OsFileSystem;

        fs.write_bytes_atomic(&target, b"first", 0o644).unwrap();
        fs.write_bytes_atomic(&target, b"second", 0o644).unwrap();

        assert_eq!(fs.read_bytes(&target).unwrap(), b"second");
        // No temp files are left behind.
        let names = fs.list_dir(dir.path()).unwrap();
        assert_eq!(names, vec!["out.bin".to_string()]);
    }

    #[test]
    fn test_atomic_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.bin");
        assert!(OsFileSystem.write_bytes_atomic(&target, b"x", 0o644).is_err());
    }

    #[test]
    fn test_stat_and_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"12345").unwrap();

        let st = OsFileSystem.stat(&file).unwrap();
        assert_eq!(st.size, 5);
        assert!(!st.is_dir);
        assert!(OsFileSystem.is_file(&file));
        assert!(OsFileSystem.is_dir(dir.path()));
        assert!(!OsFileSystem.is_file(&dir.path().join("nope")));
    }

    #[test]
    fn test_create_dir_existing_reports_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let err = OsFileSystem.create_dir(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
