//! Artifact cache behaviour observed through whole imports.

mod common;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use common::{counting_system, counting_system_with_fs, FailingFs, Fixture};
use filetime::FileTime;
use modrt::runtime::{CheckHashPolicy, InvalidationMode, RuntimeConfig, Value, MAGIC_NUMBER};

fn artifact(root: &Path, stem: &str) -> PathBuf {
    root.join("__modcache__").join(format!("{}.modrt-1.modc", stem))
}

fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn import_value(config: RuntimeConfig, name: &str) -> (Option<Value>, usize) {
    let (sys, compiler, _) = counting_system(config, Duration::ZERO);
    let module = sys.import_module(name, None).unwrap();
    (module.get_attr("value"), compiler.compiles())
}

#[test]
fn test_second_system_reuses_artifact() {
    let fx = Fixture::new();
    fx.write("cached.mod", "value = 1\n");

    let (value, compiles) = import_value(fx.config(), "cached");
    assert_eq!(value, Some(Value::Int(1)));
    assert_eq!(compiles, 1);
    let data = fs::read(artifact(fx.root(), "cached")).unwrap();
    assert_eq!(&data[..4], &MAGIC_NUMBER);

    let (value, compiles) = import_value(fx.config(), "cached");
    assert_eq!(value, Some(Value::Int(1)));
    assert_eq!(compiles, 0);
}

#[test]
fn test_source_mtime_change_recompiles() {
    let fx = Fixture::new();
    let source = fx.write("clock.mod", "value = 1\n");
    set_mtime(&source, 1_600_000_000);
    import_value(fx.config(), "clock");

    // Same size, new mtime.
    fx.write("clock.mod", "value = 2\n");
    set_mtime(&source, 1_600_000_100);
    let (value, compiles) = import_value(fx.config(), "clock");
    assert_eq!(value, Some(Value::Int(2)));
    assert_eq!(compiles, 1);

    let (_, compiles) = import_value(fx.config(), "clock");
    assert_eq!(compiles, 0);
}

#[test]
fn test_bad_magic_is_recompiled_and_overwritten() {
    let fx = Fixture::new();
    fx.write("magic.mod", "value = 3\n");
    import_value(fx.config(), "magic");

    let path = artifact(fx.root(), "magic");
    let mut data = fs::read(&path).unwrap();
    data[..4].copy_from_slice(b"XXXX");
    fs::write(&path, &data).unwrap();

    let (value, compiles) = import_value(fx.config(), "magic");
    assert_eq!(value, Some(Value::Int(3)));
    assert_eq!(compiles, 1);
    assert_eq!(&fs::read(&path).unwrap()[..4], &MAGIC_NUMBER);
}

#[test]
fn test_truncated_artifact_is_recompiled() {
    let fx = Fixture::new();
    fx.write("short.mod", "value = 4\n");
    import_value(fx.config(), "short");

    let path = artifact(fx.root(), "short");
    fs::write(&path, &MAGIC_NUMBER[..]).unwrap();

    let (value, compiles) = import_value(fx.config(), "short");
    assert_eq!(value, Some(Value::Int(4)));
    assert_eq!(compiles, 1);
}

#[test]
fn test_undecodable_payload_is_recompiled() {
    let fx = Fixture::new();
    fx.write("garbled.mod", "value = 5\n");
    import_value(fx.config(), "garbled");

    let path = artifact(fx.root(), "garbled");
    let mut data = fs::read(&path).unwrap();
    data.truncate(16);
    data.extend_from_slice(b"{not json");
    fs::write(&path, &data).unwrap();

    let (value, compiles) = import_value(fx.config(), "garbled");
    assert_eq!(value, Some(Value::Int(5)));
    assert_eq!(compiles, 1);
}

#[test]
fn test_checked_hash_detects_same_size_edit() {
    let fx = Fixture::new();
    let source = fx.write("hashed.mod", "value = 1\n");
    set_mtime(&source, 1_600_000_000);
    let config = RuntimeConfig {
        invalidation_mode: InvalidationMode::CheckedHash,
        ..fx.config()
    };
    import_value(config.clone(), "hashed");

    // Same size and same mtime: only the hash can tell.
    fx.write("hashed.mod", "value = 7\n");
    set_mtime(&source, 1_600_000_000);
    let (value, compiles) = import_value(config.clone(), "hashed");
    assert_eq!(value, Some(Value::Int(7)));
    assert_eq!(compiles, 1);

    let (_, compiles) = import_value(config, "hashed");
    assert_eq!(compiles, 0);
}

#[test]
fn test_unchecked_hash_is_trusted_unless_policy_checks() {
    let fx = Fixture::new();
    fx.write("trusted.mod", "value = 1\n");
    let config = RuntimeConfig {
        invalidation_mode: InvalidationMode::UncheckedHash,
        ..fx.config()
    };
    import_value(config.clone(), "trusted");

    fx.write("trusted.mod", "value = 8\n");
    let (value, compiles) = import_value(config.clone(), "trusted");
    assert_eq!(value, Some(Value::Int(1)));
    assert_eq!(compiles, 0);

    let always = RuntimeConfig {
        check_hash_based: CheckHashPolicy::Always,
        ..config.clone()
    };
    let (value, compiles) = import_value(always, "trusted");
    assert_eq!(value, Some(Value::Int(8)));
    assert_eq!(compiles, 1);

    // The rewritten entry stays unchecked; further edits are trusted again.
    fx.write("trusted.mod", "value = 9\n");
    let (value, _) = import_value(config, "trusted");
    assert_eq!(value, Some(Value::Int(8)));
}

#[test]
fn test_never_policy_trusts_checked_entries() {
    let fx = Fixture::new();
    fx.write("policy.mod", "value = 1\n");
    let config = RuntimeConfig {
        invalidation_mode: InvalidationMode::CheckedHash,
        ..fx.config()
    };
    import_value(config.clone(), "policy");

    fx.write("policy.mod", "value = 2\n");
    let never = RuntimeConfig {
        check_hash_based: CheckHashPolicy::Never,
        ..config
    };
    let (value, compiles) = import_value(never, "policy");
    assert_eq!(value, Some(Value::Int(1)));
    assert_eq!(compiles, 0);
}

#[test]
fn test_failed_artifact_writes_are_not_surfaced() {
    let fx = Fixture::new();
    fx.write("w.mod", "value = 1\n");
    let fs = Arc::new(FailingFs::refusing(
        io::ErrorKind::PermissionDenied,
        io::ErrorKind::Other,
    ));

    // The cache directory cannot be created.
    let (sys, compiler, _) = counting_system_with_fs(fx.config(), Duration::ZERO, fs.clone());
    let module = sys.import_module("w", None).unwrap();
    assert_eq!(module.get_attr("value"), Some(Value::Int(1)));
    assert_eq!(compiler.compiles(), 1);
    assert!(!fx.root().join("__modcache__").exists());

    // The directory exists but the artifact write is refused.
    fx.mkdir("__modcache__");
    let (sys, compiler, _) = counting_system_with_fs(fx.config(), Duration::ZERO, fs.clone());
    let module = sys.import_module("w", None).unwrap();
    assert_eq!(module.get_attr("value"), Some(Value::Int(1)));
    assert_eq!(compiler.compiles(), 1);
    assert!(!artifact(fx.root(), "w").exists());
    assert_eq!(fs.writes(), 0);
}

#[test]
fn test_cache_dir_created_concurrently_still_written() {
    let fx = Fixture::new();
    fx.write("raced.mod", "value = 2\n");
    let fs = Arc::new(FailingFs::losing_first_create_race());

    let (sys, _, _) = counting_system_with_fs(fx.config(), Duration::ZERO, fs.clone());
    sys.import_module("raced", None).unwrap();
    assert!(artifact(fx.root(), "raced").is_file());
    assert_eq!(fs.writes(), 1);

    let (value, compiles) = import_value(fx.config(), "raced");
    assert_eq!(value, Some(Value::Int(2)));
    assert_eq!(compiles, 0);
}

#[test]
fn test_dont_write_cache_leaves_tree_clean() {
    let fx = Fixture::new();
    fx.write("quiet.mod", "value = 1\n");
    let config = RuntimeConfig {
        dont_write_cache: true,
        ..fx.config()
    };

    let (_, compiles) = import_value(config.clone(), "quiet");
    assert_eq!(compiles, 1);
    assert!(!fx.root().join("__modcache__").exists());

    let (_, compiles) = import_value(config, "quiet");
    assert_eq!(compiles, 1);
}

#[test]
fn test_disabled_cache_tag_never_writes() {
    let fx = Fixture::new();
    fx.write("untagged.mod", "value = 1\n");
    let config = RuntimeConfig {
        cache_tag: None,
        ..fx.config()
    };

    let (sys, _, _) = counting_system(config, Duration::ZERO);
    let module = sys.import_module("untagged", None).unwrap();
    assert!(module.cached().is_none());
    assert!(!fx.root().join("__modcache__").exists());
}

#[test]
fn test_cache_prefix_redirects_artifacts() {
    let fx = Fixture::new();
    let prefix = tempfile::tempdir().unwrap();
    fx.write("pkg/__init__.mod", "");
    fx.write("pkg/deep.mod", "value = 6\n");
    let config = RuntimeConfig {
        cache_prefix: Some(prefix.path().to_path_buf()),
        ..fx.config()
    };

    let (sys, _, _) = counting_system(config.clone(), Duration::ZERO);
    let module = sys.import_module("pkg.deep", None).unwrap();

    let source_dir = fx.root().join("pkg");
    let relative = source_dir.strip_prefix("/").unwrap();
    let expected = prefix.path().join(relative).join("deep.modrt-1.modc");
    assert!(expected.is_file(), "missing {}", expected.display());
    assert_eq!(module.cached().as_deref(), Some(expected.to_string_lossy().as_ref()));
    assert!(!source_dir.join("__modcache__").exists());

    let (value, compiles) = import_value(config, "pkg.deep");
    assert_eq!(value, Some(Value::Int(6)));
    assert_eq!(compiles, 0);
}

#[cfg(unix)]
#[test]
fn test_artifact_mode_follows_source() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let source = fx.write("perm.mod", "value = 1\n");
    fs::set_permissions(&source, fs::Permissions::from_mode(0o444)).unwrap();
    import_value(fx.config(), "perm");

    let mode = fs::metadata(artifact(fx.root(), "perm")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}
