//! Targeted configuration PIDs
//!
//! A targeted PID narrows a configuration to specific modules by appending
//! `|symbolic-name`, `|version` and `|location` segments to the service PID:
//!
//! ```text
//! com.acme.foo
//! com.acme.foo|com.acme.bundle
//! com.acme.foo|com.acme.bundle|1.0.0
//! com.acme.foo|com.acme.bundle|1.0.0|file:/bundles/acme.jar
//! ```

use crate::module::ModuleInfo;
use std::fmt;

/// Decides which modules a configuration PID applies to
pub trait PidTarget: Send + Sync {
    /// The plain service PID, without targeting segments
    fn service_pid(&self) -> &str;

    /// Whether a holder owned by `module` answers to this PID
    fn matches_target(&self, module: &ModuleInfo) -> bool;
}

const SEPARATOR: char = '|';

/// A parsed `pid|name|version|location` string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetedPid {
    raw: String,
    service_pid: String,
    symbolic_name: Option<String>,
    version: Option<String>,
    location: Option<String>,
}

impl TargetedPid {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        // The location may itself contain separators, so split at most 4 ways
        let mut segments = raw.splitn(4, SEPARATOR).map(str::to_string);
        let service_pid = segments.next().unwrap_or_default();
        let symbolic_name = segments.next();
        let version = segments.next();
        let location = segments.next();

        Self {
            raw,
            service_pid,
            symbolic_name,
            version,
            location,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Number of targeting segments present (0 to 3)
    pub fn precision(&self) -> usize {
        [&self.symbolic_name, &self.version, &self.location]
            .iter()
            .filter(|segment| segment.is_some())
            .count()
    }

    /// True if this PID targets more precisely than `other`
    pub fn binds_stronger(&self, other: Option<&TargetedPid>) -> bool {
        match other {
            None => true,
            Some(other) => self.precision() > other.precision(),
        }
    }
}

impl PidTarget for TargetedPid {
    fn service_pid(&self) -> &str {
        &self.service_pid
    }

    fn matches_target(&self, module: &ModuleInfo) -> bool {
        let Some(name) = &self.symbolic_name else {
            return true;
        };
        if module.symbolic_name.as_deref() != Some(name.as_str()) {
            return false;
        }
        if let Some(version) = &self.version {
            if module.version.as_deref() != Some(version.as_str()) {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if module.location != *location {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for TargetedPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
