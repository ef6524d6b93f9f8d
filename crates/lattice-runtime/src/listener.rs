//! Service events and per-filter listener aggregation
//!
//! A module subscribes to the service directory once per distinct filter.
//! Every component interested in that filter joins the filter's aggregator,
//! which fans each event out to a copy-on-write snapshot of its members.

use lattice_core::ServiceRef;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Kind of change reported by the service directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEventKind {
    Registered,
    Modified,
    /// Modified so that it no longer matches the listener's filter
    ModifiedEndMatch,
    Unregistering,
}

type DeferredAction = Box<dyn FnOnce() + Send>;

/// A change to one service
///
/// Listeners may defer work until every listener has seen the event; the
/// aggregator runs deferred actions once fan-out completes.
pub struct ServiceEvent {
    kind: ServiceEventKind,
    reference: ServiceRef,
    deferred: Mutex<Vec<DeferredAction>>,
}

impl ServiceEvent {
    pub fn new(kind: ServiceEventKind, reference: ServiceRef) -> Self {
        Self {
            kind,
            reference,
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> ServiceEventKind {
        self.kind
    }

    pub fn reference(&self) -> &ServiceRef {
        &self.reference
    }

    /// Queue `action` to run after all listeners have been notified
    pub fn defer(&self, action: impl FnOnce() + Send + 'static) {
        self.deferred.lock().push(Box::new(action));
    }

    /// Run and clear deferred actions in the order they were queued
    pub fn run_deferred(&self) {
        let actions = std::mem::take(&mut *self.deferred.lock());
        for action in actions {
            action();
        }
    }
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEvent")
            .field("kind", &self.kind)
            .field("reference", &self.reference)
            .finish()
    }
}

/// Receives service events
pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent);
}

/// True if both handles point at the same listener object
pub fn same_listener(a: &Arc<dyn ServiceListener>, b: &Arc<dyn ServiceListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Fans one subscription out to every listener registered for a filter
pub struct ListenerAggregator {
    filter: String,
    listeners: Mutex<Arc<Vec<Arc<dyn ServiceListener>>>>,
}

impl ListenerAggregator {
    pub fn new(filter: impl Into<String>, first: Arc<dyn ServiceListener>) -> Self {
        Self {
            filter: filter.into(),
            listeners: Mutex::new(Arc::new(vec![first])),
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn add(&self, listener: Arc<dyn ServiceListener>) {
        let mut listeners = self.listeners.lock();
        let mut updated = Vec::with_capacity(listeners.len() + 1);
        updated.extend(listeners.iter().cloned());
        updated.push(listener);
        *listeners = Arc::new(updated);
    }

    /// Remove `listener`; returns true if the aggregator is now empty
    pub fn remove(&self, listener: &Arc<dyn ServiceListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let updated: Vec<_> = listeners
            .iter()
            .filter(|existing| !same_listener(existing, listener))
            .cloned()
            .collect();
        let empty = updated.is_empty();
        *listeners = Arc::new(updated);
        empty
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

impl ServiceListener for ListenerAggregator {
    fn service_changed(&self, event: &ServiceEvent) {
        let snapshot = self.listeners.lock().clone();
        for listener in snapshot.iter() {
            listener.service_changed(event);
        }
        event.run_deferred();
    }
}

impl fmt::Debug for ListenerAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerAggregator")
            .field("filter", &self.filter)
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::ServiceId;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ServiceListener for Recorder {
        fn service_changed(&self, event: &ServiceEvent) {
            self.log.lock().push(format!("{}:{:?}", self.name, event.kind()));
            let log = self.log.clone();
            let name = self.name;
            event.defer(move || log.lock().push(format!("{}:deferred", name)));
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn ServiceListener> {
        Arc::new(Recorder {
            name,
            log: log.clone(),
        })
    }

    #[test]
    fn test_fan_out_then_deferred() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let aggregator = ListenerAggregator::new("(objectClass=Foo)", recorder("a", &log));
        aggregator.add(recorder("b", &log));

        let event = ServiceEvent::new(
            ServiceEventKind::Registered,
            ServiceRef::new(ServiceId::new(1)),
        );
        aggregator.service_changed(&event);

        assert_eq!(
            *log.lock(),
            vec!["a:Registered", "b:Registered", "a:deferred", "b:deferred"]
        );
    }

    #[test]
    fn test_remove_reports_empty() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let b = recorder("b", &log);
        let aggregator = ListenerAggregator::new("(x=1)", a.clone());
        aggregator.add(b.clone());

        assert!(!aggregator.remove(&a));
        assert_eq!(aggregator.len(), 1);
        // Removing an unknown listener changes nothing
        assert!(!aggregator.remove(&a));
        assert!(aggregator.remove(&b));
        assert!(aggregator.is_empty());
    }
}
