//! Runtime Configuration
//!
//! Knobs for path search and the compiled-artifact cache. Configuration is
//! layered:
//!
//! 1. Built-in defaults (`RuntimeConfig::default()`)
//! 2. A TOML file (`modrt.toml`, or `~/.config/modrt/config.toml`)
//! 3. Environment overrides (`MODRT_*`)
//!
//! ## TOML Format
//!
//! ```toml
//! search_path = ["lib", "vendor"]
//! dont_write_cache = false
//! check_hash_based = "default"      # "default" | "always" | "never"
//! invalidation_mode = "timestamp"   # "timestamp" | "checked-hash" | "unchecked-hash"
//! cache_tag = "modrt-1"
//! cache_prefix = "/tmp/modrt-cache"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

/// Default implementation tag used to namespace artifact file names.
pub const DEFAULT_CACHE_TAG: &str = "modrt-1";

/// When hash-based artifacts are checked against their source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckHashPolicy {
    /// Check only entries flagged "check source".
    #[default]
    Default,
    /// Check every hash-based entry.
    Always,
    /// Trust every hash-based entry.
    Never,
}

impl CheckHashPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

/// How freshly written artifacts are validated on later loads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidationMode {
    /// Source mtime + size.
    #[default]
    Timestamp,
    /// Source hash, checked on load.
    CheckedHash,
    /// Source hash, trusted on load unless policy says otherwise.
    UncheckedHash,
}

/// Configuration for an `ImportSystem`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Initial top-level search path.
    pub search_path: Vec<PathBuf>,

    /// Never write compiled artifacts.
    pub dont_write_cache: bool,

    pub check_hash_based: CheckHashPolicy,

    /// Mode for newly written artifacts when no earlier entry dictates one.
    pub invalidation_mode: InvalidationMode,

    /// Implementation tag; `None` disables the artifact cache entirely.
    pub cache_tag: Option<String>,

    /// Directory (beside the source) holding artifacts.
    pub cache_dir_name: String,

    /// Redirect all artifacts into a parallel tree rooted here.
    pub cache_prefix: Option<PathBuf>,

    pub source_suffixes: Vec<String>,
    pub compiled_suffixes: Vec<String>,
    pub extension_suffixes: Vec<String>,

    /// File stem marking a directory as a regular package.
    pub package_init: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            search_path: Vec::new(),
            dont_write_cache: false,
            check_hash_based: CheckHashPolicy::Default,
            invalidation_mode: InvalidationMode::Timestamp,
            cache_tag: Some(DEFAULT_CACHE_TAG.to_string()),
            cache_dir_name: "__modcache__".to_string(),
            cache_prefix: None,
            source_suffixes: vec![".mod".to_string()],
            compiled_suffixes: vec![".modc".to_string()],
            extension_suffixes: vec![".native".to_string()],
            package_init: "__init__".to_string(),
        }
    }
}

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl RuntimeConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default user configuration file (`<config dir>/modrt/config.toml`).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("modrt").join("config.toml"))
    }

    /// Load `./modrt.toml`, else the user configuration, else defaults;
    /// then apply environment overrides.
    pub fn discover() -> Result<Self, ConfigError> {
        let local = PathBuf::from("modrt.toml");
        let mut config = if local.is_file() {
            Self::from_file(&local)?
        } else {
            match Self::user_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `MODRT_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(path) = get("MODRT_PATH") {
            let extra: Vec<PathBuf> = std::env::split_paths(&path)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            debug!(entries = extra.len(), "MODRT_PATH prepended to search path");
            self.search_path.splice(0..0, extra);
        }
        if let Some(flag) = get("MODRT_DONT_WRITE_CACHE") {
            self.dont_write_cache = !flag.is_empty() && flag != "0";
        }
        if let Some(prefix) = get("MODRT_CACHE_PREFIX") {
            self.cache_prefix = (!prefix.is_empty()).then(|| PathBuf::from(prefix));
        }
        if let Some(policy) = get("MODRT_CHECK_HASH_BASED").as_deref().and_then(CheckHashPolicy::parse) {
            self.check_hash_based = policy;
        }
    }

    /// Search path as the string entries path finders consume.
    pub fn search_path_entries(&self) -> Vec<String> {
        self.search_path
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }
}
