//! Units of deferred work
//!
//! TigerStyle: Every task carries a label so failures can be attributed.

use crate::error::Result;
use std::fmt;

/// A labelled unit of work run once by a scheduler
pub struct Task {
    label: String,
    body: Box<dyn FnOnce() -> Result<()> + Send + 'static>,
}

impl Task {
    pub fn new<F>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            label: label.into(),
            body: Box::new(body),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Consume the task and run it on the current thread
    pub fn run(self) -> Result<()> {
        (self.body)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

/// Something that accepts tasks for later execution
///
/// Implementations must never block the caller on the task itself and must
/// never fail: a task that cannot be run is dropped with a log entry.
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, task: Task);
}
