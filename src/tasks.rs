//! Background tasks
//!
//! Every background activity is the same loop: wait one period on the
//! cancellation token, stop if it fired, otherwise run one unit of work. A
//! unit that has started always finishes; cancellation is only observed
//! between units.

use crate::config::Settings;
use crate::core::models::Role;
use crate::core::shared_record::SharedStore;
use crate::error::{WardenError, WardenResult};
use crate::journal::Journal;
use crate::supervisor::WorkerSupervisor;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Shared shutdown request. Cloning hands out another handle to the same
/// flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Block for `period` or until cancelled, whichever comes first.
    /// Returns whether cancellation was requested.
    pub fn sleep(&self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self
                .inner
                .wakeup
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *cancelled
    }
}

/// A running periodic task.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    runs: Arc<AtomicU64>,
    // disconnects when the task thread leaves its loop (or unwinds)
    finished: Receiver<()>,
    thread: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Units of work completed so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    /// Wait until `deadline` for the thread to stop. A thread still running
    /// after that is detached and reported as abandoned.
    pub fn join_until(self, deadline: Instant) -> bool {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.finished.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let runs = self.runs();
                if self.thread.join().is_err() {
                    error!(task = %self.name, "task thread panicked");
                }
                debug!(task = %self.name, runs, "task stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(task = %self.name, "task did not stop in time, abandoning its thread");
                false
            }
        }
    }
}

/// Start `unit` on its own thread, once per `period`, until `token` fires.
pub fn spawn_periodic<F>(
    name: &str,
    period: Duration,
    token: CancellationToken,
    mut unit: F,
) -> WardenResult<TaskHandle>
where
    F: FnMut() -> WardenResult<()> + Send + 'static,
{
    let (finished_tx, finished_rx) = bounded::<()>(1);
    let runs = Arc::new(AtomicU64::new(0));
    let thread_runs = Arc::clone(&runs);
    let task = name.to_string();

    let thread = thread::Builder::new()
        .name(format!("cw-{name}"))
        .spawn(move || {
            let _finished = finished_tx;
            debug!(task = %task, ?period, "task started");
            while !token.sleep(period) {
                if let Err(err) = unit() {
                    warn!(task = %task, error = %err, "unit of work failed");
                }
                thread_runs.fetch_add(1, Ordering::AcqRel);
            }
            debug!(task = %task, "task observed cancellation");
        })
        .map_err(|source| WardenError::Thread {
            name: name.to_string(),
            source,
        })?;

    Ok(TaskHandle {
        name: name.to_string(),
        runs,
        finished: finished_rx,
        thread,
    })
}

/// `counter += 1` under the lock.
pub fn counter_unit(store: Arc<SharedStore>) -> impl FnMut() -> WardenResult<()> + Send + 'static {
    move || store.with_lock(|record| record.counter = record.counter.wrapping_add(1))
}

/// Read the counter under the lock, journal it after releasing.
pub fn snapshot_unit(
    store: Arc<SharedStore>,
    journal: Journal,
) -> impl FnMut() -> WardenResult<()> + Send + 'static {
    move || {
        let counter = store.with_lock(|record| record.counter)?;
        info!(counter, "Counter = {counter}");
        journal.append(Role::Master, format!("Counter = {counter}"))
    }
}

pub fn respawn_unit(supervisor: WorkerSupervisor) -> impl FnMut() -> WardenResult<()> + Send + 'static {
    move || supervisor.tick().map(|_| ())
}

/// The tasks of one process. Subordinates only run the counter task.
#[derive(Debug)]
pub struct TaskSet {
    token: CancellationToken,
    handles: Vec<TaskHandle>,
}

impl TaskSet {
    pub fn start(
        role: Role,
        settings: &Settings,
        store: &Arc<SharedStore>,
        journal: &Journal,
        supervisor: Option<WorkerSupervisor>,
        token: &CancellationToken,
    ) -> WardenResult<Self> {
        let mut set = TaskSet {
            token: token.clone(),
            handles: Vec::new(),
        };

        let counter = spawn_periodic(
            "counter",
            settings.counter_period(),
            token.clone(),
            counter_unit(Arc::clone(store)),
        );
        set.push(counter)?;

        if role.is_master() {
            let snapshot = spawn_periodic(
                "snapshot",
                settings.snapshot_period(),
                token.clone(),
                snapshot_unit(Arc::clone(store), journal.clone()),
            );
            set.push(snapshot)?;

            if let Some(supervisor) = supervisor {
                let respawn = spawn_periodic(
                    "respawn",
                    settings.respawn_period(),
                    token.clone(),
                    respawn_unit(supervisor),
                );
                set.push(respawn)?;
            }
        }

        info!(role = %role, tasks = ?set.names(), "background tasks started");
        Ok(set)
    }

    // already-started tasks are stopped again if a later one fails to start
    fn push(&mut self, handle: WardenResult<TaskHandle>) -> WardenResult<()> {
        match handle {
            Ok(handle) => {
                self.handles.push(handle);
                Ok(())
            }
            Err(err) => {
                self.token.cancel();
                for handle in self.handles.drain(..) {
                    handle.join_until(Instant::now() + Duration::from_secs(1));
                }
                Err(err)
            }
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(TaskHandle::name).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel and wait for every task, all sharing one `timeout`. Returns the
    /// number of abandoned threads.
    pub fn shutdown(self, timeout: Duration) -> usize {
        self.token.cancel();
        let deadline = Instant::now() + timeout;
        let abandoned = self
            .handles
            .into_iter()
            .map(|handle| handle.join_until(deadline))
            .filter(|stopped| !stopped)
            .count();
        if abandoned > 0 {
            warn!(abandoned, "some background tasks were abandoned at shutdown");
        }
        abandoned
    }
}
