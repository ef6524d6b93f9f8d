//! The host framework as seen by one module

use crate::listener::ServiceListener;
use lattice_core::{ModuleInfo, Result, ServiceRef};
use std::any::Any;
use std::sync::Arc;

/// A service object handed out by the service directory
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Access to the instances of one prototype-scoped service
pub trait ServiceObjects: Send + Sync {
    fn service_ref(&self) -> &ServiceRef;

    /// Obtain a new instance; `None` if the service is gone
    fn get_service(&self) -> Option<ServiceInstance>;

    /// Return an instance obtained from [`get_service`](Self::get_service)
    fn unget_service(&self, instance: &ServiceInstance) -> Result<()>;
}

/// Per-module view of the host framework
///
/// Implemented by the framework integration. The runtime never holds one of
/// its own locks while calling into a context, except when subscribing the
/// first listener for a filter.
pub trait ModuleContext: Send + Sync {
    fn module(&self) -> &ModuleInfo;

    /// Value of a module header, such as `Service-Component`
    fn header(&self, name: &str) -> Option<String>;

    /// Entries under `path` whose file name matches `pattern`
    fn find_entries(&self, path: &str, pattern: &str) -> Vec<String>;

    fn read_entry(&self, entry: &str) -> Result<Vec<u8>>;

    /// Subscribe `listener` to service events matching `filter`
    ///
    /// # Errors
    /// `InvalidFilter` if the filter cannot be parsed.
    fn subscribe(&self, filter: &str, listener: Arc<dyn ServiceListener>) -> Result<()>;

    fn unsubscribe(&self, listener: &Arc<dyn ServiceListener>);

    /// Prototype access to `reference`; `None` if it is no longer registered
    fn service_objects(&self, reference: &ServiceRef) -> Option<Arc<dyn ServiceObjects>>;
}
