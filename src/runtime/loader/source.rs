//! File loaders for source and compiled-only modules.

use std::path::{Path, PathBuf};

use super::{check_name, file_is_package};
use crate::runtime::code::{decode_source, CodeObject};
use crate::runtime::error::{ImportError, ImportResult};
use crate::runtime::ImportSystem;

/// Loads a module from a source file, going through the artifact cache.
#[derive(Debug, Clone)]
pub struct SourceFileLoader {
    name: String,
    path: PathBuf,
}

impl SourceFileLoader {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_code(&self, name: &str, sys: &ImportSystem) -> ImportResult<CodeObject> {
        check_name(&self.name, name)?;
        sys.artifact_cache().read_or_compile(name, &self.path)
    }

    pub fn get_source(&self, name: &str, sys: &ImportSystem) -> ImportResult<String> {
        check_name(&self.name, name)?;
        let bytes = sys
            .fs()
            .read_bytes(&self.path)
            .map_err(|e| ImportError::io(&self.path, &e))?;
        Ok(decode_source(&bytes, &self.path.to_string_lossy())?)
    }

    pub fn is_package(&self, name: &str, sys: &ImportSystem) -> bool {
        file_is_package(&self.path, name, &sys.config().package_init)
    }
}

/// Loads a module from a compiled artifact with no companion source.
#[derive(Debug, Clone)]
pub struct SourcelessFileLoader {
    name: String,
    path: PathBuf,
}

impl SourcelessFileLoader {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_code(&self, name: &str, sys: &ImportSystem) -> ImportResult<CodeObject> {
        check_name(&self.name, name)?;
        sys.artifact_cache().load_compiled(name, &self.path)
    }

    pub fn is_package(&self, name: &str, sys: &ImportSystem) -> bool {
        file_is_package(&self.path, name, &sys.config().package_init)
    }
}
