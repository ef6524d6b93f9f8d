//! Registry error types
//!
//! TigerStyle: Explicit error variants with context.

use crate::key::RegistryKey;
use lattice_core::Error;
use thiserror::Error;

/// Registry-specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Name already reserved or registered under this key
    #[error("component name '{name}' has already been registered by module {module}")]
    NameConflict {
        name: String,
        module: String,
        existing: Option<String>,
    },

    /// `register` called without a prior reservation
    #[error("component {key} was not reserved before registration")]
    NotReserved { key: String },

    /// `register` called twice for the same reservation
    #[error("component {key} is already registered")]
    AlreadyRegistered { key: String },
}

impl RegistryError {
    /// Create a name conflict error
    pub fn name_conflict(key: &RegistryKey, existing: Option<String>) -> Self {
        Self::NameConflict {
            name: key.name().to_string(),
            module: key.module().to_string(),
            existing,
        }
    }

    /// Registry misuse by the caller, never worth retrying
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::NotReserved { .. } | Self::AlreadyRegistered { .. }
        )
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NameConflict {
                name,
                module,
                existing,
            } => Error::NameConflict {
                name,
                module,
                existing,
            },
            other => Error::illegal_state(other.to_string()),
        }
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::ModuleId;

    #[test]
    fn test_error_display() {
        let key = RegistryKey::new(ModuleId::new(3), "Foo");
        let err = RegistryError::name_conflict(&key, None);
        assert!(err.to_string().contains("'Foo'"));
        assert!(err.to_string().contains("module 3"));
    }

    #[test]
    fn test_conversion_preserves_conflict() {
        let key = RegistryKey::new(ModuleId::new(3), "Foo");
        let err: Error = RegistryError::name_conflict(&key, Some("com.acme.Foo".into())).into();
        assert!(matches!(err, Error::NameConflict { ref name, .. } if name == "Foo"));
    }

    #[test]
    fn test_misuse_becomes_illegal_state() {
        let err = RegistryError::NotReserved { key: "3/Foo".into() };
        assert!(err.is_programming_error());

        let err: Error = err.into();
        assert!(err.is_programming_error());
    }
}
