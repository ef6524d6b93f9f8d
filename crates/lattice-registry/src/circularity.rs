//! Per-thread detection of reentrant service resolution
//!
//! Resolving a dependency calls into the service directory, which may call
//! back into resolution of the same service on the same thread. Each thread
//! keeps a stack of the references it is currently resolving; seeing a
//! reference twice means the caller must give up the synchronous path.
//!
//! Stacks are keyed by detector so several registries can share a thread,
//! and a thread's entry is dropped once its stack empties.

use lattice_core::ServiceRef;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    static RESOLUTION_STACKS: RefCell<HashMap<u64, Vec<ServiceRef>>> = RefCell::new(HashMap::new());
}

static NEXT_DETECTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Tracks in-flight resolutions on each thread
#[derive(Debug)]
pub struct CircularityDetector {
    id: u64,
}

impl CircularityDetector {
    pub fn new() -> Self {
        Self {
            id: NEXT_DETECTOR_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Push `reference` onto this thread's stack
    ///
    /// Returns `Err` with a snapshot of the stack, leaving it unchanged, if
    /// the reference is already being resolved on this thread.
    pub fn enter(&self, reference: &ServiceRef) -> Result<(), Vec<ServiceRef>> {
        RESOLUTION_STACKS.with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            let stack = stacks.entry(self.id).or_default();
            if stack.contains(reference) {
                return Err(stack.clone());
            }
            stack.push(reference.clone());
            Ok(())
        })
    }

    /// Pop `reference` from this thread's stack
    ///
    /// Removes it from wherever it sits if it is not on top. A reference
    /// that was never entered is ignored.
    pub fn leave(&self, reference: &ServiceRef) {
        RESOLUTION_STACKS.with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            let Some(stack) = stacks.get_mut(&self.id) else {
                return;
            };
            if stack.last() == Some(reference) {
                stack.pop();
            } else if let Some(position) = stack.iter().rposition(|r| r == reference) {
                stack.remove(position);
            }
            if stack.is_empty() {
                stacks.remove(&self.id);
            }
        })
    }

    /// Number of references being resolved on the current thread
    pub fn depth(&self) -> usize {
        RESOLUTION_STACKS.with(|stacks| stacks.borrow().get(&self.id).map_or(0, Vec::len))
    }

    /// Whether the current thread holds any state for this detector
    pub fn has_thread_state(&self) -> bool {
        RESOLUTION_STACKS.with(|stacks| stacks.borrow().contains_key(&self.id))
    }
}

impl Default for CircularityDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::ServiceId;

    fn service(id: u64) -> ServiceRef {
        ServiceRef::new(ServiceId::new(id))
    }

    #[test]
    fn test_reentry_is_detected() {
        let detector = CircularityDetector::new();
        let d = service(1);

        assert!(detector.enter(&d).is_ok());
        let stack = detector.enter(&d).unwrap_err();
        assert_eq!(stack, vec![d.clone()]);
        assert_eq!(detector.depth(), 1);

        detector.leave(&d);
        assert_eq!(detector.depth(), 0);
        assert!(!detector.has_thread_state());
        assert!(detector.enter(&d).is_ok());
        detector.leave(&d);
    }

    #[test]
    fn test_leave_out_of_order() {
        let detector = CircularityDetector::new();
        let (a, b, c) = (service(1), service(2), service(3));
        detector.enter(&a).unwrap();
        detector.enter(&b).unwrap();
        detector.enter(&c).unwrap();

        detector.leave(&a);
        assert_eq!(detector.depth(), 2);
        assert!(detector.enter(&a).is_ok());

        detector.leave(&a);
        detector.leave(&c);
        detector.leave(&b);
        assert!(!detector.has_thread_state());
    }

    #[test]
    fn test_leave_unknown_is_ignored() {
        let detector = CircularityDetector::new();
        detector.leave(&service(9));
        assert!(!detector.has_thread_state());
    }

    #[test]
    fn test_threads_are_independent() {
        let detector = std::sync::Arc::new(CircularityDetector::new());
        let d = service(1);
        detector.enter(&d).unwrap();

        let other = detector.clone();
        let candidate = d.clone();
        let entered = std::thread::spawn(move || {
            let ok = other.enter(&candidate).is_ok();
            other.leave(&candidate);
            ok
        })
        .join()
        .unwrap();

        assert!(entered);
        detector.leave(&d);
    }

    #[test]
    fn test_detectors_are_independent() {
        let first = CircularityDetector::new();
        let second = CircularityDetector::new();
        let d = service(1);

        first.enter(&d).unwrap();
        assert!(second.enter(&d).is_ok());
        first.leave(&d);
        second.leave(&d);
    }
}
