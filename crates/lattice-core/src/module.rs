//! Module identity
//!
//! TigerStyle: Explicit identifiers, no stringly-typed module handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an installed module, issued by the host framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(u64);

impl ModuleId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive information about a module
///
/// The symbolic name, version and location are what targeted configuration
/// PIDs match against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: ModuleId,
    #[serde(default)]
    pub symbolic_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub location: String,
}

impl ModuleInfo {
    /// Create module info with only an id and a location
    pub fn new(id: ModuleId, location: impl Into<String>) -> Self {
        Self {
            id,
            symbolic_name: None,
            version: None,
            location: location.into(),
        }
    }

    pub fn with_symbolic_name(mut self, name: impl Into<String>) -> Self {
        self.symbolic_name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Human readable label used in diagnostics
    pub fn label(&self) -> String {
        match (&self.symbolic_name, &self.version) {
            (Some(name), Some(version)) => format!("{}/{} ({})", name, version, self.id),
            (Some(name), None) => format!("{} ({})", name, self.id),
            _ => format!("{} ({})", self.location, self.id),
        }
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
