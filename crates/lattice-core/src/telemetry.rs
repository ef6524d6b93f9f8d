//! Logging initialization
//!
//! TigerStyle: Explicit telemetry configuration, env filter with a
//! configured fallback.

use crate::error::{Error, Result};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported in the startup event
    pub service_name: String,
    /// Whether to output events to stdout
    pub stdout_enabled: bool,
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "lattice".to_string(),
            stdout_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Disable stdout output
    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `LATTICE_SERVICE_NAME`: Service name (default: "lattice")
    /// - `RUST_LOG`: Log level filter (default: "info")
    /// - `LATTICE_LOG_STDOUT`: Emit to stdout (default: true)
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("LATTICE_SERVICE_NAME").unwrap_or_else(|_| "lattice".to_string());

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let stdout_enabled = std::env::var("LATTICE_LOG_STDOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        Self {
            service_name,
            stdout_enabled,
            log_level,
        }
    }
}

/// Install the global tracing subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.stdout_enabled {
        Some(tracing_subscriber::fmt::layer().with_thread_names(true))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Internal {
            message: format!("failed to initialize tracing subscriber: {}", e),
        })?;

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        _service_name: config.service_name,
    })
}

/// Keeps telemetry alive for the lifetime of the process
pub struct TelemetryGuard {
    _service_name: String,
}
