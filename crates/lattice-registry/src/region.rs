//! Reference-counted configuration tracking per module
//!
//! TigerStyle: At most one live handle per key; a handle whose count reached
//! zero can never be referenced again.

use crate::holder::ComponentHolder;
use lattice_core::{ModuleId, Result};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Delivers configuration to the holders of one region
pub trait ConfigurationTracker: Send + Sync {
    /// Begin tracking; called once, outside any registry lock
    fn start(&self) -> Result<()>;

    /// Stop tracking; called once when the last reference is released
    fn stop(&self);

    /// Push current configuration to `holder`
    ///
    /// Returns true if any configuration was applied.
    fn configure_holder(&self, holder: &Arc<dyn ComponentHolder>) -> bool;
}

/// A shared, counted handle around one configuration tracker
pub struct RegionHandle {
    module: ModuleId,
    references: AtomicUsize,
    tracker: Box<dyn ConfigurationTracker>,
}

impl RegionHandle {
    fn new(module: ModuleId, tracker: Box<dyn ConfigurationTracker>) -> Self {
        Self {
            module,
            references: AtomicUsize::new(1),
            tracker,
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn tracker(&self) -> &dyn ConfigurationTracker {
        self.tracker.as_ref()
    }

    pub fn reference_count(&self) -> usize {
        self.references.load(Ordering::SeqCst)
    }

    /// Add a reference unless the handle is already being discarded
    fn reference(&self) -> bool {
        self.references
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count > 0).then(|| count + 1)
            })
            .is_ok()
    }

    /// Drop a reference, returning true if it was the last one
    fn dereference(&self) -> bool {
        let previous = self
            .references
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            });
        matches!(previous, Ok(1))
    }
}

impl fmt::Debug for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionHandle")
            .field("module", &self.module)
            .field("references", &self.reference_count())
            .finish()
    }
}

/// Map of module identity to its live region handle
#[derive(Debug, Default)]
pub struct RegionRegistry {
    handles: Mutex<HashMap<ModuleId, Arc<RegionHandle>>>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the handle for `module`
    ///
    /// `factory` runs with no lock held, so it may consult this registry.
    /// Racing creators may each build a candidate; only the one that lands
    /// in the map is started, the others are dropped unstarted.
    pub fn acquire<F>(&self, module: ModuleId, factory: F) -> Arc<RegionHandle>
    where
        F: Fn() -> Box<dyn ConfigurationTracker>,
    {
        loop {
            if let Some(existing) = self.get(module) {
                if existing.reference() {
                    return existing;
                }
                // Being discarded by a concurrent release; wait for it to leave the map
                std::thread::yield_now();
                continue;
            }

            let candidate = Arc::new(RegionHandle::new(module, factory()));
            let existing = {
                let mut handles = self.handles.lock();
                match handles.entry(module) {
                    Entry::Vacant(slot) => {
                        slot.insert(candidate.clone());
                        None
                    }
                    Entry::Occupied(slot) => Some(slot.get().clone()),
                }
            };

            let Some(existing) = existing else {
                debug!(module = %module, "Created region handle");
                if let Err(e) = candidate.tracker.start() {
                    error!(module = %module, error = %e, "Failed to start configuration tracker");
                }
                return candidate;
            };

            debug!(module = %module, "Lost region handle race; discarding candidate");
            drop(candidate);
            if existing.reference() {
                return existing;
            }
            std::thread::yield_now();
        }
    }

    /// Drop one reference to `handle`
    ///
    /// Returns true if this was the last reference, in which case the map
    /// entry is removed and the tracker stopped.
    pub fn release(&self, handle: &Arc<RegionHandle>) -> bool {
        if !handle.dereference() {
            return false;
        }

        {
            let mut handles = self.handles.lock();
            if let Entry::Occupied(slot) = handles.entry(handle.module) {
                if Arc::ptr_eq(slot.get(), handle) {
                    slot.remove();
                }
            }
        }

        debug!(module = %handle.module, "Discarded region handle");
        handle.tracker.stop();
        true
    }

    pub fn get(&self, module: ModuleId) -> Option<Arc<RegionHandle>> {
        self.handles.lock().get(&module).cloned()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}
