// src/scheduler/dispatcher.rs

//! Dispatcher loop and the worker-side execution path.
//!
//! A single dedicated thread owns candidate selection: per iteration it
//! sweeps lazily-cancelled tasks, collects every `Waiting` task whose
//! start instant has passed and whose pending-predecessor count is zero
//! (handle-ascending), marks them `Ready`, and hands them to the worker
//! pool outside the registry lock. Between scans it parks on a condvar,
//! woken by submission, completion, cancellation or shutdown, with the
//! timed wait capped so the next start instant is never overslept.
//!
//! User code runs exclusively on pool workers, never on this thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::registry::{settle_dependents, RegistryInner};
use crate::task::{CompletionLatch, Outcome, Recurrence, TaskRecord, TaskState};
use crate::{clock, cron};

use super::Core;

/// Upper bound on one timed wait. Bounds wall-clock drift for calendar
/// tasks and puts a floor under cancellation-sweep latency.
const DISPATCH_CEILING: Duration = Duration::from_millis(10);

/// Wake-up channel between the facade/workers and the dispatcher.
///
/// The flag absorbs notifications that arrive while the dispatcher is
/// mid-scan, so an eligibility change is never lost between a scan and
/// the following wait.
pub(crate) struct WakeSignal {
    signalled: Mutex<bool>,
    wake: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        *self.signalled.lock() = true;
        self.wake.notify_one();
    }

    fn wait_timeout(&self, timeout: Duration) {
        let mut signalled = self.signalled.lock();
        if !*signalled {
            let _ = self.wake.wait_for(&mut signalled, timeout);
        }
        *signalled = false;
    }
}

/// Body of the dispatcher thread.
pub(crate) fn run_loop(core: Arc<Core>) {
    debug!("dispatcher started");

    while !core.shutdown.load(Ordering::Acquire) {
        let now = clock::mono_now();
        let mut due: Vec<Arc<TaskRecord>> = Vec::new();
        let next_start;
        {
            let mut inner = core.registry.lock();

            // Sweep before selection: dependents unblocked by a lazy
            // cancellation are picked up in this same iteration.
            sweep_cancelled(&mut inner);

            // Select first, then mutate; BTreeMap iteration fixes the
            // handle-ascending dispatch order.
            let due_ids: Vec<u64> = inner
                .slots
                .iter()
                .filter(|(_, slot)| {
                    slot.state == TaskState::Waiting
                        && !slot.record.cancelled.load(Ordering::Acquire)
                        && slot.record.pending_predecessors.load(Ordering::Acquire) == 0
                        && slot.start_at.is_some_and(|at| at <= now)
                })
                .map(|(id, _)| *id)
                .collect();

            for id in due_ids {
                if let Some(slot) = inner.slots.get_mut(&id) {
                    slot.state = TaskState::Ready;
                    if matches!(slot.record.kind, Recurrence::Once) {
                        // One-shot tasks must never be selected twice.
                        slot.start_at = None;
                    }
                    due.push(slot.record.clone());
                }
            }

            next_start = inner
                .slots
                .values()
                .filter(|slot| slot.state == TaskState::Waiting)
                .filter_map(|slot| slot.start_at)
                .min();
        }

        // Registry lock released: hand candidates to the pool.
        for record in due {
            debug!(task = %record.handle, "dispatching to worker pool");
            let worker_core = Arc::clone(&core);
            core.pool.enqueue(move || execute(worker_core, record));
        }

        let timeout = match next_start {
            Some(at) => at.saturating_duration_since(now).min(DISPATCH_CEILING),
            None => DISPATCH_CEILING,
        };
        core.wake.wait_timeout(timeout);
    }

    debug!("dispatcher exiting");
}

/// Lazy cancellation: a `Waiting` task whose flag is set never dispatches;
/// it is transitioned here, its latch resolved, and its dependents
/// unblocked.
fn sweep_cancelled(inner: &mut RegistryInner) {
    let swept: Vec<u64> = inner
        .slots
        .iter()
        .filter(|(_, slot)| {
            slot.state == TaskState::Waiting && slot.record.cancelled.load(Ordering::Acquire)
        })
        .map(|(id, _)| *id)
        .collect();

    for id in swept {
        let (handle, latch) = match inner.slots.get_mut(&id) {
            Some(slot) => {
                slot.state = TaskState::Cancelled;
                debug!(task = %slot.record.handle, "cancelled before dispatch");
                (slot.record.handle, slot.latch.clone())
            }
            None => continue,
        };
        latch.resolve(Outcome::Cancelled);
        settle_dependents(inner, handle);
    }
}

/// Worker-side execution of one fire. Runs on a pool thread.
///
/// Every terminal-or-rearm transition settles this task's dependent
/// edges in the same critical section, so a concurrent `insert` computes
/// its pending count against a consistent picture of which predecessors
/// have already settled.
pub(crate) fn execute(core: Arc<Core>, record: Arc<TaskRecord>) {
    let handle = record.handle;

    // The flag may have been set between selection and pickup.
    if record.cancelled.load(Ordering::Acquire) {
        let (latch, newly_eligible) = {
            let mut inner = core.registry.lock();
            let latch = inner.slots.get_mut(&handle.id()).map(|slot| {
                slot.state = TaskState::Cancelled;
                slot.latch.clone()
            });
            (latch, settle_dependents(&mut inner, handle))
        };
        if let Some(latch) = latch {
            latch.resolve(Outcome::Cancelled);
        }
        debug!(task = %handle, "cancelled at pickup");
        if newly_eligible {
            core.wake.notify();
        }
        return;
    }

    let latch = {
        let mut inner = core.registry.lock();
        match inner.slots.get_mut(&handle.id()) {
            Some(slot) => {
                slot.state = TaskState::Running;
                slot.latch.clone()
            }
            None => return,
        }
    };

    debug!(task = %handle, "running");
    let outcome = match catch_unwind(AssertUnwindSafe(|| (record.work)())) {
        Ok(()) => Outcome::Success,
        Err(payload) => {
            let cause = panic_cause(payload);
            warn!(task = %handle, cause = %cause, "task panicked");
            Outcome::Failed(cause)
        }
    };

    let newly_eligible = match record.kind {
        Recurrence::Once => {
            let failed = matches!(outcome, Outcome::Failed(_));
            let newly_eligible = {
                let mut inner = core.registry.lock();
                if let Some(slot) = inner.slots.get_mut(&handle.id()) {
                    slot.state = if failed {
                        TaskState::Failed
                    } else {
                        TaskState::Completed
                    };
                }
                settle_dependents(&mut inner, handle)
            };
            latch.resolve(outcome);
            newly_eligible
        }
        Recurrence::Every(_) | Recurrence::Calendar(_) => {
            // Waiters who grabbed this fire's latch observe its outcome;
            // rearming installs a fresh one.
            latch.resolve(outcome);
            let next = next_start_of(&record);
            let mut inner = core.registry.lock();
            rearm(&mut inner, &record, next);
            settle_dependents(&mut inner, handle)
        }
    };
    if newly_eligible {
        core.wake.notify();
    }
}

/// Next start instant of a recurring task, computed outside the registry
/// lock. `None` means the calendar has no future occurrence.
fn next_start_of(record: &Arc<TaskRecord>) -> Option<Instant> {
    match &record.kind {
        Recurrence::Every(interval) => Some(clock::mono_now() + *interval),
        Recurrence::Calendar(schedule) => {
            cron::next_fire(schedule, clock::wall_now()).map(clock::wall_to_monotonic)
        }
        Recurrence::Once => None,
    }
}

/// Swing a recurring task back to `Waiting` for its next fire. If it was
/// cancelled mid-fire, or its calendar has no future occurrence, the
/// recurrence ends here instead.
fn rearm(inner: &mut RegistryInner, record: &Arc<TaskRecord>, next: Option<Instant>) {
    let handle = record.handle;
    let Some(slot) = inner.slots.get_mut(&handle.id()) else {
        return;
    };

    if record.cancelled.load(Ordering::Acquire) {
        slot.state = TaskState::Cancelled;
        slot.latch = Arc::new(CompletionLatch::resolved(Outcome::Cancelled));
        debug!(task = %handle, "cancelled during fire; recurrence stopped");
        return;
    }

    match next {
        Some(at) => {
            slot.start_at = Some(at);
            slot.latch = Arc::new(CompletionLatch::new());
            slot.state = TaskState::Waiting;
        }
        None => {
            slot.state = TaskState::Cancelled;
            slot.latch = Arc::new(CompletionLatch::resolved(Outcome::Cancelled));
            warn!(task = %handle, "calendar schedule has no future fire; stopping task");
        }
    }
}

fn panic_cause(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
