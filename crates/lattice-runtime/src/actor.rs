//! Single-threaded component actor
//!
//! TigerStyle: One worker thread, strict FIFO, a failing task never stops
//! the worker.
//!
//! Work that must not run on the thread that triggered it (late bindings,
//! asynchronous enable and disable) is queued here. Tasks run one at a time
//! in submission order.

use crate::latch::{Latch, OpenOnDrop};
use lattice_core::error::{Error, Result};
use lattice_core::{metrics, Task, TaskScheduler};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Commands processed by the actor thread
pub enum ActorCommand {
    /// Run a task
    Run(Task),
    /// Stop after the tasks queued before this command
    Terminate,
}

#[derive(Debug, Default)]
struct ActorCounters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Task counts since the actor started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorStats {
    pub scheduled: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Serial executor backed by a dedicated thread
pub struct ActorExecutor {
    name: String,
    command_tx: mpsc::UnboundedSender<ActorCommand>,
    worker_thread: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
    stopped: Arc<Latch>,
    counters: Arc<ActorCounters>,
}

impl ActorExecutor {
    /// Spawn the actor thread
    pub fn start(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        assert!(!name.is_empty(), "actor thread name must not be empty");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(Latch::new());
        let counters = Arc::new(ActorCounters::default());

        let worker = {
            let stopped = stopped.clone();
            let counters = counters.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(command_rx, &counters, &stopped))
                .map_err(|e| {
                    Error::internal(format!("failed to spawn actor thread {}: {}", name, e))
                })?
        };

        info!(actor = %name, "Component actor started");
        Ok(Self {
            name,
            command_tx,
            worker_thread: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            stopped,
            counters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when called from the actor thread itself
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_thread
    }

    pub fn worker_thread_id(&self) -> ThreadId {
        self.worker_thread
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_open()
    }

    pub fn stats(&self) -> ActorStats {
        ActorStats {
            scheduled: self.counters.scheduled.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Stop the actor once the tasks queued so far have run
    ///
    /// # Errors
    /// `Timeout` if the worker has not finished within `timeout`. The worker
    /// keeps draining in the background.
    pub fn shutdown(&self, timeout: Duration) -> Result<()> {
        // A closed channel means the worker is already gone
        let _ = self.command_tx.send(ActorCommand::Terminate);

        if self.is_worker_thread() {
            debug!(actor = %self.name, "Shutdown requested from the actor thread; not waiting");
            return Ok(());
        }

        if !self.stopped.wait(timeout) {
            warn!(
                actor = %self.name,
                timeout_ms = timeout.as_millis() as u64,
                "Component actor did not stop in time"
            );
            return Err(Error::timeout(
                format!("actor {} to stop", self.name),
                timeout.as_millis() as u64,
            ));
        }

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!(actor = %self.name, "Component actor thread panicked");
            }
        }
        Ok(())
    }
}

impl TaskScheduler for ActorExecutor {
    fn schedule(&self, task: Task) {
        match self.command_tx.send(ActorCommand::Run(task)) {
            Ok(()) => {
                self.counters.scheduled.fetch_add(1, Ordering::SeqCst);
            }
            Err(mpsc::error::SendError(command)) => {
                if let ActorCommand::Run(task) = command {
                    warn!(
                        actor = %self.name,
                        task = task.label(),
                        "Component actor stopped; dropping task"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for ActorExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorExecutor")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn run_worker(
    mut command_rx: mpsc::UnboundedReceiver<ActorCommand>,
    counters: &ActorCounters,
    stopped: &Latch,
) {
    let _stopped = OpenOnDrop(stopped);

    while let Some(command) = command_rx.blocking_recv() {
        match command {
            ActorCommand::Run(task) => execute(task, counters),
            ActorCommand::Terminate => {
                info!("Component actor shutting down");
                break;
            }
        }
    }

    command_rx.close();
    while let Ok(command) = command_rx.try_recv() {
        if let ActorCommand::Run(task) = command {
            warn!(task = task.label(), "Dropping task queued after shutdown");
        }
    }
    info!("Component actor stopped");
}

fn execute(task: Task, counters: &ActorCounters) {
    let label = task.label().to_string();
    debug!(task = %label, "Running task");

    match panic::catch_unwind(AssertUnwindSafe(move || task.run())) {
        Ok(Ok(())) => {
            counters.completed.fetch_add(1, Ordering::SeqCst);
            metrics::record_actor_task("success");
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            metrics::record_actor_task("error");
            error!(task = %label, error = %e, "Task failed");
        }
        Err(payload) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            metrics::record_actor_task("panic");
            error!(task = %label, panic = %panic_message(payload.as_ref()), "Task panicked");
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
