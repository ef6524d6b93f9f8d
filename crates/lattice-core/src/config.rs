//! Configuration for Lattice
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration for the component runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Component registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Module activator configuration
    #[serde(default)]
    pub activator: ActivatorConfig,

    /// Component actor configuration
    #[serde(default)]
    pub actor: ActorConfig,
}

impl RuntimeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.activator.validate()?;
        self.actor.validate()?;
        Ok(())
    }

    /// Build a configuration from framework properties
    ///
    /// Reads `ds.lock.timeout.milliseconds`, `ds.stop.timeout.milliseconds`
    /// and `ds.service.changecount.timeout`. Absent keys keep their defaults.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = parse_millis(properties, PROPERTY_LOCK_TIMEOUT)? {
            config.activator.lock_timeout_ms = value;
        }
        if let Some(value) = parse_millis(properties, PROPERTY_STOP_TIMEOUT)? {
            config.activator.stop_timeout_ms = value;
        }
        if let Some(value) = parse_millis(properties, PROPERTY_CHANGECOUNT_TIMEOUT)? {
            config.registry.service_changecount_timeout_ms = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// How long a second dispose caller waits for the first to finish
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.activator.lock_timeout_ms)
    }

    /// How long shutdown waits for the actor to drain
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.activator.stop_timeout_ms)
    }

    /// Debounce window for change count publication, `None` to publish immediately
    pub fn changecount_window(&self) -> Option<Duration> {
        match self.registry.service_changecount_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

fn parse_millis(properties: &HashMap<String, String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = properties.get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidConfiguration {
            field: key.to_string(),
            reason: format!("'{}' is not a millisecond value: {}", raw, e),
        })
}

/// Component registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Debounce window for change count publication (milliseconds, 0 = immediate)
    #[serde(default = "default_changecount_timeout_ms")]
    pub service_changecount_timeout_ms: u64,
}

fn default_changecount_timeout_ms() -> u64 {
    CHANGECOUNT_WINDOW_MS_DEFAULT
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            service_changecount_timeout_ms: default_changecount_timeout_ms(),
        }
    }
}

impl RegistryConfig {
    fn validate(&self) -> Result<()> {
        if self.service_changecount_timeout_ms > CHANGECOUNT_WINDOW_MS_MAX {
            return Err(Error::InvalidConfiguration {
                field: "registry.service_changecount_timeout_ms".into(),
                reason: format!("must be <= {}", CHANGECOUNT_WINDOW_MS_MAX),
            });
        }
        Ok(())
    }
}

/// Module activator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivatorConfig {
    /// Wait for a concurrent dispose to complete (milliseconds)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Wait for the actor to drain on shutdown (milliseconds)
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    LOCK_TIMEOUT_MS_DEFAULT
}

fn default_stop_timeout_ms() -> u64 {
    STOP_TIMEOUT_MS_DEFAULT
}

impl Default for ActivatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl ActivatorConfig {
    fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 || self.lock_timeout_ms > LOCK_TIMEOUT_MS_MAX {
            return Err(Error::InvalidConfiguration {
                field: "activator.lock_timeout_ms".into(),
                reason: format!("must be between 1 and {}", LOCK_TIMEOUT_MS_MAX),
            });
        }
        if self.stop_timeout_ms == 0 || self.stop_timeout_ms > STOP_TIMEOUT_MS_MAX {
            return Err(Error::InvalidConfiguration {
                field: "activator.stop_timeout_ms".into(),
                reason: format!("must be between 1 and {}", STOP_TIMEOUT_MS_MAX),
            });
        }
        Ok(())
    }
}

/// Component actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Run scheduled work on a dedicated actor thread
    #[serde(default = "default_actor_enabled")]
    pub enabled: bool,

    /// Name of the actor thread
    #[serde(default = "default_actor_thread_name")]
    pub thread_name: String,
}

fn default_actor_enabled() -> bool {
    true
}

fn default_actor_thread_name() -> String {
    ACTOR_THREAD_NAME_DEFAULT.to_string()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            enabled: default_actor_enabled(),
            thread_name: default_actor_thread_name(),
        }
    }
}

impl ActorConfig {
    fn validate(&self) -> Result<()> {
        if self.thread_name.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "actor.thread_name".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.thread_name.len() > ACTOR_THREAD_NAME_LENGTH_BYTES_MAX {
            return Err(Error::InvalidConfiguration {
                field: "actor.thread_name".into(),
                reason: format!("must be <= {} bytes", ACTOR_THREAD_NAME_LENGTH_BYTES_MAX),
            });
        }
        Ok(())
    }
}
