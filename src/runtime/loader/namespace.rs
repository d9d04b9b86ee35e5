//! Loader for namespace packages.

use crate::runtime::code::CodeObject;
use crate::runtime::error::ImportResult;
use crate::runtime::finder::SearchLocations;
use crate::runtime::ImportSystem;

/// Loader synthesized for a package with no initializer file.
#[derive(Debug, Clone)]
pub struct NamespaceLoader {
    name: String,
    locations: SearchLocations,
}

impl NamespaceLoader {
    pub fn new(name: impl Into<String>, locations: SearchLocations) -> Self {
        Self {
            name: name.into(),
            locations,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The package's live search path.
    pub fn search_locations(&self) -> &SearchLocations {
        &self.locations
    }

    pub fn get_code(&self, sys: &ImportSystem) -> ImportResult<CodeObject> {
        Ok(sys.compiler().compile("", "<string>")?)
    }
}
