//! Lattice Core
//!
//! Core types, errors, and constants for the Lattice component runtime.
//!
//! # Overview
//!
//! Lattice manages components declared by dynamically installed modules.
//! Components depend on services that may appear and disappear at any time;
//! the runtime keeps component names unique, avoids reentrant resolution
//! deadlocks, and publishes a generation counter of structural changes.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `COMPONENT_NAME_LENGTH_BYTES_MAX`)
//! - No recursion (bounded iteration only)

pub mod config;
pub mod constants;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod module;
pub mod pid;
pub mod service;
pub mod task;
pub mod telemetry;

pub use config::{ActivatorConfig, ActorConfig, RegistryConfig, RuntimeConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use metadata::{ComponentMetadata, ConfigurationPolicy};
pub use module::{ModuleId, ModuleInfo};
pub use pid::{PidTarget, TargetedPid};
pub use service::{ComponentId, ServiceId, ServiceRef};
pub use task::{Task, TaskScheduler};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
