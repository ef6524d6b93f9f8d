//! Debounced publication of the registry generation counter
//!
//! TigerStyle: One pending timer at most; the published value is always a
//! value the counter actually held; no lock is held while publishing.
//!
//! Every structural change bumps the counter. With a debounce window the
//! first bump starts a timer thread that publishes after the window and keeps
//! going while bumps arrive, so a burst of changes costs one publication.

use lattice_core::constants::CHANGECOUNT_THREAD_NAME;
use lattice_core::{metrics, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Receives the current change count
pub trait ChangeCountPublisher: Send + Sync {
    fn publish(&self, change_count: u64) -> Result<()>;
}

#[derive(Debug, Default)]
struct TimerState {
    running: bool,
    shutdown: bool,
}

struct Shared {
    count: AtomicU64,
    window: Option<Duration>,
    publisher: RwLock<Option<Arc<dyn ChangeCountPublisher>>>,
    // Highest value successfully published; never held across a publish call
    published: Mutex<Option<u64>>,
    timer: Mutex<TimerState>,
    wakeup: Condvar,
}

impl Shared {
    /// Publish the current value
    ///
    /// The publisher runs with no lock held, so it may bump the counter
    /// itself. A late result never lowers the recorded value.
    fn publish_current(&self) -> u64 {
        let value = self.count.load(Ordering::SeqCst);
        let publisher = self.publisher.read().clone();

        let Some(publisher) = publisher else {
            debug!(change_count = value, "No change count publisher attached");
            return value;
        };

        match publisher.publish(value) {
            Ok(()) => {
                let mut published = self.published.lock();
                *published = Some(published.map_or(value, |prev| prev.max(value)));
                drop(published);
                metrics::record_change_count_published();
                debug!(change_count = value, "Published change count");
            }
            Err(e) => {
                debug!(change_count = value, error = %e, "Failed to publish change count");
            }
        }
        value
    }

    fn run_timer(self: Arc<Self>, window: Duration) {
        loop {
            {
                let mut timer = self.timer.lock();
                let deadline = Instant::now() + window;
                while !timer.shutdown {
                    if self.wakeup.wait_until(&mut timer, deadline).timed_out() {
                        break;
                    }
                }
                if timer.shutdown {
                    timer.running = false;
                    return;
                }
            }

            let value = self.publish_current();

            let mut timer = self.timer.lock();
            if timer.shutdown || self.count.load(Ordering::SeqCst) == value {
                timer.running = false;
                return;
            }
        }
    }
}

/// Monotonic generation counter with debounced publication
#[derive(Clone)]
pub struct ChangeCounter {
    shared: Arc<Shared>,
}

impl ChangeCounter {
    /// Create a counter; `None` publishes on every bump
    pub fn new(window: Option<Duration>) -> Self {
        Self {
            shared: Arc::new(Shared {
                count: AtomicU64::new(0),
                window: window.filter(|w| !w.is_zero()),
                publisher: RwLock::new(None),
                published: Mutex::new(None),
                timer: Mutex::new(TimerState::default()),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Attach the publisher and publish the current value once
    pub fn set_publisher(&self, publisher: Arc<dyn ChangeCountPublisher>) {
        *self.shared.publisher.write() = Some(publisher);
        self.shared.publish_current();
    }

    pub fn current(&self) -> u64 {
        self.shared.count.load(Ordering::SeqCst)
    }

    /// Value of the last successful publication
    pub fn last_published(&self) -> Option<u64> {
        *self.shared.published.lock()
    }

    /// Increment the counter and arrange for it to be published
    pub fn bump(&self) -> u64 {
        let value = self.shared.count.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(window) = self.shared.window else {
            self.shared.publish_current();
            return value;
        };

        {
            let mut timer = self.shared.timer.lock();
            if timer.running || timer.shutdown {
                return value;
            }
            timer.running = true;
        }

        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name(CHANGECOUNT_THREAD_NAME.to_string())
            .spawn(move || shared.run_timer(window));

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start change count timer; publishing immediately");
            self.shared.timer.lock().running = false;
            self.shared.publish_current();
        }
        value
    }

    /// True while a debounce timer is pending
    pub fn is_timer_pending(&self) -> bool {
        self.shared.timer.lock().running
    }

    /// Cancel any pending timer; later bumps no longer publish via a timer
    pub fn shutdown(&self) {
        let mut timer = self.shared.timer.lock();
        timer.shutdown = true;
        self.shared.wakeup.notify_all();
    }
}

impl std::fmt::Debug for ChangeCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeCounter")
            .field("current", &self.current())
            .field("window", &self.shared.window)
            .finish()
    }
}
