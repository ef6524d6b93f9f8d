//! Metrics collection for Lattice
//!
//! TigerStyle: Explicit metric names with units, type-safe recording.
//!
//! Counters are recorded through the global OpenTelemetry meter when the
//! `otel` feature is enabled. Without it every function is a no-op.

#[cfg(feature = "otel")]
use crate::constants::*;
#[cfg(feature = "otel")]
use once_cell::sync::Lazy;
#[cfg(feature = "otel")]
use opentelemetry::metrics::Counter;
#[cfg(feature = "otel")]
use opentelemetry::{global, KeyValue};

#[cfg(feature = "otel")]
static COMPONENTS_REGISTERED_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("lattice")
        .u64_counter(METRIC_NAME_COMPONENTS_REGISTERED_TOTAL)
        .with_description("Total number of components registered")
        .init()
});

#[cfg(feature = "otel")]
static COMPONENTS_UNREGISTERED_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("lattice")
        .u64_counter(METRIC_NAME_COMPONENTS_UNREGISTERED_TOTAL)
        .with_description("Total number of components unregistered")
        .init()
});

#[cfg(feature = "otel")]
static NAME_CONFLICTS_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("lattice")
        .u64_counter(METRIC_NAME_NAME_CONFLICTS_TOTAL)
        .with_description("Total number of rejected name reservations")
        .init()
});

#[cfg(feature = "otel")]
static LATE_BINDINGS_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("lattice")
        .u64_counter(METRIC_NAME_LATE_BINDINGS_TOTAL)
        .with_description("Total number of late bindings scheduled")
        .init()
});

#[cfg(feature = "otel")]
static ACTOR_TASKS_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("lattice")
        .u64_counter(METRIC_NAME_ACTOR_TASKS_TOTAL)
        .with_description("Total number of actor tasks executed")
        .init()
});

#[cfg(feature = "otel")]
static CHANGECOUNT_PUBLISHED_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("lattice")
        .u64_counter(METRIC_NAME_CHANGECOUNT_PUBLISHED_TOTAL)
        .with_description("Total number of change count publications")
        .init()
});

/// Record a component holder registration
#[cfg(feature = "otel")]
pub fn record_component_registered() {
    COMPONENTS_REGISTERED_COUNTER.add(1, &[]);
}

/// Record a component holder removal
#[cfg(feature = "otel")]
pub fn record_component_unregistered() {
    COMPONENTS_UNREGISTERED_COUNTER.add(1, &[]);
}

/// Record a rejected name reservation
#[cfg(feature = "otel")]
pub fn record_name_conflict() {
    NAME_CONFLICTS_COUNTER.add(1, &[]);
}

/// Record late bindings handed to the actor
///
/// # Arguments
/// * `bindings` - Number of parked binders replayed by the task
#[cfg(feature = "otel")]
pub fn record_late_binding_scheduled(bindings: usize) {
    LATE_BINDINGS_COUNTER.add(bindings as u64, &[]);
}

/// Record an executed actor task
///
/// # Arguments
/// * `status` - "success", "error" or "panic"
#[cfg(feature = "otel")]
pub fn record_actor_task(status: &str) {
    ACTOR_TASKS_COUNTER.add(1, &[KeyValue::new("status", status.to_string())]);
}

/// Record a change count publication
#[cfg(feature = "otel")]
pub fn record_change_count_published() {
    CHANGECOUNT_PUBLISHED_COUNTER.add(1, &[]);
}

// No-op implementations when otel feature is disabled

#[cfg(not(feature = "otel"))]
pub fn record_component_registered() {}

#[cfg(not(feature = "otel"))]
pub fn record_component_unregistered() {}

#[cfg(not(feature = "otel"))]
pub fn record_name_conflict() {}

#[cfg(not(feature = "otel"))]
pub fn record_late_binding_scheduled(_bindings: usize) {}

#[cfg(not(feature = "otel"))]
pub fn record_actor_task(_status: &str) {}

#[cfg(not(feature = "otel"))]
pub fn record_change_count_published() {}
