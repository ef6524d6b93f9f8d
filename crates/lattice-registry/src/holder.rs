//! Collaborator traits stored by the registry
//!
//! The registry treats holders, binders and instances as opaque handles. It
//! never calls into them while holding one of its own locks.

use lattice_core::{ComponentMetadata, ModuleInfo, Result, ServiceRef};
use std::fmt;

/// Why a holder is being disposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalReason {
    /// The owning module stopped
    ModuleStopped,
    /// The component was explicitly removed
    Disposed,
    /// The whole runtime is shutting down
    RuntimeShutdown,
}

impl fmt::Display for DisposalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ModuleStopped => "module stopped",
            Self::Disposed => "disposed",
            Self::RuntimeShutdown => "runtime shutdown",
        };
        f.write_str(reason)
    }
}

/// Manages the configurations and instances of one declared component
pub trait ComponentHolder: Send + Sync + fmt::Debug {
    fn metadata(&self) -> &ComponentMetadata;

    /// The module that declared the component
    fn owner(&self) -> &ModuleInfo;

    fn enable_components(&self, asynchronous: bool) -> Result<()>;

    fn disable_components(&self, asynchronous: bool) -> Result<()>;

    fn dispose_components(&self, reason: DisposalReason) -> Result<()>;
}

/// A dependency manager that can complete a binding after the fact
pub trait LateBinder: Send + Sync + fmt::Debug {
    /// Bind `service`, which was unavailable when first requested
    ///
    /// `tracking_count` is the dependency tracker value recorded when the
    /// binding was parked, so the binder can discard stale events.
    fn bind_late(&self, service: &ServiceRef, tracking_count: u64);
}

/// A live, numbered component instance
pub trait ComponentInstance: Send + Sync + fmt::Debug {
    fn component_name(&self) -> &str;
}
