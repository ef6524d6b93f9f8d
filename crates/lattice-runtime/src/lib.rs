//! Lattice Runtime
//!
//! Module activation, the component actor and the runtime facade.
//!
//! # Overview
//!
//! - [`ComponentRuntime`]: starts and stops modules against a shared registry
//! - [`ModuleComponentActivator`]: owns the components of one module
//! - [`ActorExecutor`]: serial executor for work that must leave the caller's thread
//! - [`ServiceObjectsHelper`]: per-module cache of prototype service handles
//!
//! # Example
//!
//! ```rust,ignore
//! let runtime = ComponentRuntime::builder()
//!     .with_holder_factory(factory)
//!     .with_descriptor_parser(parser)
//!     .build()?;
//!
//! let activator = runtime.start_module(context, None)?;
//! runtime.stop_module(activator.module().id, DisposalReason::ModuleStopped)?;
//! runtime.shutdown()?;
//! ```

pub mod activator;
pub mod actor;
pub mod context;
pub mod descriptor;
mod latch;
pub mod listener;
pub mod runtime;
pub mod service_objects;

pub use activator::{ActivatorParts, ComponentSelector, HolderFactory, ModuleComponentActivator};
pub use actor::{ActorCommand, ActorExecutor, ActorStats};
pub use context::{ModuleContext, ServiceInstance, ServiceObjects};
pub use descriptor::{find_descriptors, load_descriptors, split_location, DescriptorParser};
pub use listener::{
    same_listener, ListenerAggregator, ServiceEvent, ServiceEventKind, ServiceListener,
};
pub use runtime::{ComponentRuntime, ConfigurationTrackerFactory, RuntimeBuilder};
pub use service_objects::{ComponentServiceObjects, ServiceObjectsHelper};
