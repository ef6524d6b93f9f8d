//! TigerStyle constants for Lattice
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Component Limits
// =============================================================================

/// Maximum length of a component name in bytes
pub const COMPONENT_NAME_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of a configuration PID in bytes
pub const CONFIGURATION_PID_LENGTH_BYTES_MAX: usize = 512;

/// Maximum number of configuration PIDs a single component may declare
pub const COMPONENT_PIDS_COUNT_MAX: usize = 64;

// =============================================================================
// Activator Timeouts
// =============================================================================

/// Default wait for a concurrent dispose to complete in milliseconds (5 sec)
pub const LOCK_TIMEOUT_MS_DEFAULT: u64 = 5 * 1000;

/// Maximum lock timeout in milliseconds (10 min)
pub const LOCK_TIMEOUT_MS_MAX: u64 = 10 * 60 * 1000;

/// Default wait for the actor to drain on shutdown in milliseconds (1 min)
pub const STOP_TIMEOUT_MS_DEFAULT: u64 = 60 * 1000;

/// Maximum stop timeout in milliseconds (10 min)
pub const STOP_TIMEOUT_MS_MAX: u64 = 10 * 60 * 1000;

// =============================================================================
// Change Count
// =============================================================================

/// Default debounce window for change count publication in milliseconds (5 sec)
pub const CHANGECOUNT_WINDOW_MS_DEFAULT: u64 = 5 * 1000;

/// Maximum debounce window in milliseconds (10 min)
pub const CHANGECOUNT_WINDOW_MS_MAX: u64 = 10 * 60 * 1000;

/// Name of the debounce timer thread
pub const CHANGECOUNT_THREAD_NAME: &str = "lattice-changecount";

// =============================================================================
// Actor
// =============================================================================

/// Default name of the component actor thread
pub const ACTOR_THREAD_NAME_DEFAULT: &str = "lattice-component-actor";

/// Maximum length of the actor thread name in bytes
pub const ACTOR_THREAD_NAME_LENGTH_BYTES_MAX: usize = 64;

// =============================================================================
// Framework Property Keys
// =============================================================================

/// Property key for the dispose lock timeout
pub const PROPERTY_LOCK_TIMEOUT: &str = "ds.lock.timeout.milliseconds";

/// Property key for the actor stop timeout
pub const PROPERTY_STOP_TIMEOUT: &str = "ds.stop.timeout.milliseconds";

/// Property key for the change count debounce window
pub const PROPERTY_CHANGECOUNT_TIMEOUT: &str = "ds.service.changecount.timeout";

// =============================================================================
// Service Properties
// =============================================================================

/// Service property naming the component that registered a service
pub const COMPONENT_NAME_PROPERTY: &str = "component.name";

/// Service property carrying the instance id of the registering component
pub const COMPONENT_ID_PROPERTY: &str = "component.id";

/// Module header listing descriptor locations
pub const SERVICE_COMPONENT_HEADER: &str = "Service-Component";

/// Wildcard selecting every component of a module
pub const COMPONENT_SELECTOR_ALL: &str = "*";

// =============================================================================
// Metrics
// =============================================================================

/// Components registered with the registry
pub const METRIC_NAME_COMPONENTS_REGISTERED_TOTAL: &str = "lattice_components_registered_total";

/// Components removed from the registry
pub const METRIC_NAME_COMPONENTS_UNREGISTERED_TOTAL: &str =
    "lattice_components_unregistered_total";

/// Rejected name reservations
pub const METRIC_NAME_NAME_CONFLICTS_TOTAL: &str = "lattice_name_conflicts_total";

/// Late bindings replayed through the actor
pub const METRIC_NAME_LATE_BINDINGS_TOTAL: &str = "lattice_late_bindings_total";

/// Tasks executed by the component actor
pub const METRIC_NAME_ACTOR_TASKS_TOTAL: &str = "lattice_actor_tasks_total";

/// Change count publications
pub const METRIC_NAME_CHANGECOUNT_PUBLISHED_TOTAL: &str = "lattice_changecount_published_total";

// Compile-time assertions for constant validity
const _: () = {
    assert!(COMPONENT_NAME_LENGTH_BYTES_MAX >= 64);
    assert!(CONFIGURATION_PID_LENGTH_BYTES_MAX >= COMPONENT_NAME_LENGTH_BYTES_MAX);
    assert!(LOCK_TIMEOUT_MS_DEFAULT <= LOCK_TIMEOUT_MS_MAX);
    assert!(STOP_TIMEOUT_MS_DEFAULT <= STOP_TIMEOUT_MS_MAX);
    assert!(CHANGECOUNT_WINDOW_MS_DEFAULT <= CHANGECOUNT_WINDOW_MS_MAX);
    assert!(ACTOR_THREAD_NAME_DEFAULT.len() <= ACTOR_THREAD_NAME_LENGTH_BYTES_MAX);
};
