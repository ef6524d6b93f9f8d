//! Lattice Registry
//!
//! The process-wide component registry and its coordination primitives.
//!
//! # Overview
//!
//! - [`ComponentRegistry`]: two-phase name reservation, PID index, instance ids
//! - [`CircularityDetector`]: per-thread reentrant resolution detection
//! - [`MissingDependencyTable`]: bindings parked until their service appears
//! - [`RegionRegistry`]: reference-counted configuration trackers per module
//! - [`ChangeCounter`]: debounced publication of the generation counter

pub mod change_count;
pub mod circularity;
pub mod error;
pub mod holder;
pub mod key;
pub mod missing;
pub mod region;
pub mod registry;

pub use change_count::{ChangeCountPublisher, ChangeCounter};
pub use circularity::CircularityDetector;
pub use error::{RegistryError, RegistryResult};
pub use holder::{ComponentHolder, ComponentInstance, DisposalReason, LateBinder};
pub use key::RegistryKey;
pub use missing::{MissingDependencyTable, PendingBinding};
pub use region::{ConfigurationTracker, RegionHandle, RegionRegistry};
pub use registry::ComponentRegistry;
