//! Dependencies parked until their service becomes visible

use crate::holder::LateBinder;
use lattice_core::{ServiceId, ServiceRef};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A binder waiting for one service, with the tracking count it was parked at
#[derive(Debug, Clone)]
pub struct PendingBinding {
    pub binder: Arc<dyn LateBinder>,
    pub tracking_count: u64,
}

/// Service reference to the binders waiting for it, in recording order
#[derive(Debug, Default)]
pub struct MissingDependencyTable {
    entries: Mutex<HashMap<ServiceId, Vec<PendingBinding>>>,
}

impl MissingDependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `binder` until `service` is available
    ///
    /// Returns the number of binders now waiting on `service`.
    pub fn record(
        &self,
        service: &ServiceRef,
        binder: Arc<dyn LateBinder>,
        tracking_count: u64,
    ) -> usize {
        let mut entries = self.entries.lock();
        let waiting = entries.entry(service.id()).or_default();
        waiting.push(PendingBinding {
            binder,
            tracking_count,
        });
        waiting.len()
    }

    /// Remove and return every binder waiting on `service`
    pub fn take(&self, service: &ServiceRef) -> Option<Vec<PendingBinding>> {
        self.entries.lock().remove(&service.id())
    }

    pub fn waiting_on(&self, service: &ServiceRef) -> usize {
        self.entries.lock().get(&service.id()).map_or(0, Vec::len)
    }

    /// Debug descriptions of the binders waiting on `service`
    pub fn describe(&self, service: &ServiceRef) -> Vec<String> {
        self.entries
            .lock()
            .get(&service.id())
            .map(|waiting| {
                waiting
                    .iter()
                    .map(|p| format!("{:?} (tracking count {})", p.binder, p.tracking_count))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of services with parked binders
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
