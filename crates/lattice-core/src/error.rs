//! Error types for Lattice
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for Lattice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lattice error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("component name '{name}' has already been registered by module {module}{}", describe_existing(.existing))]
    NameConflict {
        name: String,
        module: String,
        existing: Option<String>,
    },

    #[error("Illegal state: {reason}")]
    IllegalState { reason: String },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid descriptor for component '{component}': {reason}")]
    InvalidDescriptor { component: String, reason: String },

    #[error("Invalid service filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    // =========================================================================
    // Component Errors
    // =========================================================================
    #[error("Component {component} failed during {operation}: {reason}")]
    ComponentFailed {
        component: String,
        operation: String,
        reason: String,
    },

    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn describe_existing(existing: &Option<String>) -> String {
    existing
        .as_deref()
        .map(|e| format!(" ({})", e))
        .unwrap_or_default()
}

impl Error {
    /// Create an illegal state error
    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::IllegalState {
            reason: reason.into(),
        }
    }

    /// Create an invalid descriptor error
    pub fn invalid_descriptor(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Create a component failure error
    pub fn component_failed(
        component: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ComponentFailed {
            component: component.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error indicates a bug in the caller rather than a runtime condition
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }

    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
