//! Public scheduler facade.
//!
//! [`Scheduler`] ties together the registry, the dependency graph, the
//! dispatcher thread and the worker pool:
//!
//! - submission APIs build a task record, wire it into the graph and
//!   return a [`Handle`];
//! - the dispatcher loop selects ready tasks and hands them to the pool;
//! - `wait` / `result` observe completion through the task's latch;
//! - `start` / `stop` manage the single start→stop lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::errors::{Result, SchedulerError};
use crate::pool::WorkerPool;
use crate::registry::Registry;
use crate::task::{Handle, Outcome, Recurrence, TaskState, Work};
use crate::{clock, cron};

mod dispatcher;

use self::dispatcher::WakeSignal;

/// State shared between the facade, the dispatcher thread and the pool
/// workers.
pub(crate) struct Core {
    pub registry: Registry,
    pub pool: WorkerPool,
    pub wake: WakeSignal,
    pub shutdown: AtomicBool,
}

/// In-process task scheduler: time triggers plus a dependency DAG over a
/// fixed pool of worker threads.
///
/// Submissions are accepted before and after [`start`](Scheduler::start),
/// but nothing dispatches until the dispatcher runs. The scheduler is
/// single-lifecycle: after [`stop`](Scheduler::stop) it never runs again
/// and further submissions are rejected with [`Handle::INVALID`].
pub struct Scheduler {
    core: Arc<Core>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler with `workers` pool threads (at least one). The
    /// pool threads spawn immediately; the dispatcher thread spawns on
    /// [`start`](Scheduler::start).
    pub fn new(workers: usize) -> Self {
        Self {
            core: Arc::new(Core {
                registry: Registry::new(),
                pool: WorkerPool::new(workers),
                wake: WakeSignal::new(),
                shutdown: AtomicBool::new(false),
            }),
            dispatcher: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawn the dispatcher thread. No-op if already started or stopped.
    pub fn start(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("start after stop is a no-op");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let core = Arc::clone(&self.core);
        match std::thread::Builder::new()
            .name("chronodag-dispatcher".into())
            .spawn(move || dispatcher::run_loop(core))
        {
            Ok(handle) => {
                *self.dispatcher.lock() = Some(handle);
                info!("scheduler started");
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn dispatcher thread");
                self.started.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Shut down: wake and join the dispatcher, drain and join the worker
    /// pool, then transition every non-terminal task to `Cancelled` and
    /// resolve its latch so outstanding waiters return. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.core.shutdown.store(true, Ordering::Release);
        self.core.wake.notify();
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
        self.core.pool.shutdown();
        self.core.registry.cancel_all();
        info!("scheduler stopped");
    }

    /// Schedule a one-shot task at a monotonic instant.
    pub fn schedule_at<F>(&self, at: Instant, work: F, predecessors: &[Handle]) -> Handle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.submit(Box::new(work), Recurrence::Once, at, predecessors)
    }

    /// Schedule a one-shot task at a local wall-clock instant given as
    /// `YYYY-MM-DD HH:MM:SS`. The string is converted to a monotonic
    /// instant once, at submission; later wall-clock adjustments do not
    /// move the task. Unparseable strings are rejected with
    /// [`Handle::INVALID`].
    pub fn schedule_at_wall<F>(&self, when: &str, work: F, predecessors: &[Handle]) -> Handle
    where
        F: Fn() + Send + Sync + 'static,
    {
        match clock::parse_wall(when) {
            Some(wall) => self.submit(
                Box::new(work),
                Recurrence::Once,
                clock::wall_to_monotonic(wall),
                predecessors,
            ),
            None => {
                warn!(when, "unparseable wall-clock submission string; rejecting");
                Handle::INVALID
            }
        }
    }

    /// Schedule a calendar-driven recurring task. The next fire instant
    /// is recomputed from the wall clock after every run. Malformed
    /// expressions and schedules with no future occurrence are rejected
    /// with [`Handle::INVALID`].
    pub fn schedule_cron<F>(&self, expr: &str, work: F, predecessors: &[Handle]) -> Handle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let schedule = match cron::parse(expr) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(expr, error = %e, "rejecting calendar submission");
                return Handle::INVALID;
            }
        };
        let first = match cron::next_fire(&schedule, clock::wall_now()) {
            Some(first) => first,
            None => {
                warn!(expr, "calendar schedule has no future fire; rejecting");
                return Handle::INVALID;
            }
        };
        self.submit(
            Box::new(work),
            Recurrence::Calendar(schedule),
            clock::wall_to_monotonic(first),
            predecessors,
        )
    }

    /// Schedule an interval-driven recurring task; the first fire is one
    /// interval from now, later fires one interval after the previous run
    /// finished (no overlap). A zero interval is rejected with
    /// [`Handle::INVALID`].
    pub fn schedule_every<F>(&self, every: Duration, work: F, predecessors: &[Handle]) -> Handle
    where
        F: Fn() + Send + Sync + 'static,
    {
        if every.is_zero() {
            warn!("rejecting zero-interval recurring submission");
            return Handle::INVALID;
        }
        self.submit(
            Box::new(work),
            Recurrence::Every(every),
            clock::mono_now() + every,
            predecessors,
        )
    }

    /// Request cancellation. A `Waiting` task never dispatches; a
    /// `Running` one finishes its current fire but never rearms. No-op on
    /// tasks already in a terminal state.
    pub fn cancel(&self, handle: Handle) -> Result<()> {
        match self.core.registry.mark_cancelled(handle) {
            Some(()) => {
                self.core.wake.notify();
                Ok(())
            }
            None => Err(SchedulerError::UnknownHandle(handle)),
        }
    }

    /// Block until the task settles: a one-shot task reaching a terminal
    /// state, or a recurring task finishing the fire its current latch
    /// belongs to.
    pub fn wait(&self, handle: Handle) -> Result<Outcome> {
        let latch = self
            .core
            .registry
            .latch_of(handle)
            .ok_or(SchedulerError::UnknownHandle(handle))?;
        Ok(latch.wait())
    }

    /// Non-blocking read of the task's current outcome: `Success`,
    /// `Failed` with the panic cause, `Cancelled`, or `Pending` if no
    /// fire has completed yet.
    pub fn result(&self, handle: Handle) -> Result<Outcome> {
        let latch = self
            .core
            .registry
            .latch_of(handle)
            .ok_or(SchedulerError::UnknownHandle(handle))?;
        Ok(latch.peek())
    }

    /// Diagnostic read of the task's scheduling state.
    pub fn status(&self, handle: Handle) -> Result<TaskState> {
        self.core
            .registry
            .status_of(handle)
            .ok_or(SchedulerError::UnknownHandle(handle))
    }

    fn submit(
        &self,
        work: Work,
        kind: Recurrence,
        start_at: Instant,
        predecessors: &[Handle],
    ) -> Handle {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("submission after stop; rejecting");
            return Handle::INVALID;
        }
        let handle = self.core.registry.insert(work, kind, start_at, predecessors);
        if handle.is_valid() {
            self.core.wake.notify();
        }
        handle
    }
}

impl Default for Scheduler {
    /// A scheduler with one worker per available hardware thread.
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(workers)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
