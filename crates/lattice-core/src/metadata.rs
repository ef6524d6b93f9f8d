//! Parsed component descriptors
//!
//! TigerStyle: Validation up front, explicit limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a component reacts to configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationPolicy {
    /// Activate with or without configuration
    #[default]
    Optional,
    /// Activate only once configuration is present
    Require,
    /// Never consult configuration
    Ignore,
}

/// Descriptor of one declared component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    /// Component name, unique within its module
    pub name: String,

    /// Implementation the holder instantiates
    pub implementation: String,

    /// Configuration PIDs; empty means the component name
    #[serde(default)]
    pub configuration_pids: Vec<String>,

    /// Enabled when the module starts
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub configuration_policy: ConfigurationPolicy,

    /// Factory identifier for factory components
    #[serde(default)]
    pub factory: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ComponentMetadata {
    pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            configuration_pids: Vec::new(),
            enabled: true,
            configuration_policy: ConfigurationPolicy::default(),
            factory: None,
        }
    }

    pub fn with_configuration_pid(mut self, pid: impl Into<String>) -> Self {
        self.configuration_pids.push(pid.into());
        self
    }

    pub fn with_policy(mut self, policy: ConfigurationPolicy) -> Self {
        self.configuration_policy = policy;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Effective configuration PIDs, defaulting to the component name
    pub fn configuration_pids(&self) -> Vec<&str> {
        if self.configuration_pids.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.configuration_pids.iter().map(String::as_str).collect()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_configuration_ignored(&self) -> bool {
        self.configuration_policy == ConfigurationPolicy::Ignore
    }

    /// Check the descriptor is usable before reserving its name
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_descriptor(&self.name, "name must not be empty"));
        }
        if self.name.len() > COMPONENT_NAME_LENGTH_BYTES_MAX {
            return Err(Error::invalid_descriptor(
                &self.name,
                format!(
                    "name is {} bytes, limit is {}",
                    self.name.len(),
                    COMPONENT_NAME_LENGTH_BYTES_MAX
                ),
            ));
        }
        if self.implementation.trim().is_empty() {
            return Err(Error::invalid_descriptor(
                &self.name,
                "implementation must not be empty",
            ));
        }
        if self.configuration_pids.len() > COMPONENT_PIDS_COUNT_MAX {
            return Err(Error::invalid_descriptor(
                &self.name,
                format!("more than {} configuration pids", COMPONENT_PIDS_COUNT_MAX),
            ));
        }

        let mut seen = HashSet::new();
        for pid in &self.configuration_pids {
            if pid.trim().is_empty() {
                return Err(Error::invalid_descriptor(
                    &self.name,
                    "configuration pid must not be empty",
                ));
            }
            if pid.len() > CONFIGURATION_PID_LENGTH_BYTES_MAX {
                return Err(Error::invalid_descriptor(
                    &self.name,
                    format!("configuration pid '{}' is too long", pid),
                ));
            }
            if !seen.insert(pid.as_str()) {
                return Err(Error::invalid_descriptor(
                    &self.name,
                    format!("configuration pid '{}' declared twice", pid),
                ));
            }
        }
        Ok(())
    }
}
