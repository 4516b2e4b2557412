//! Task data model: handles, states, fire outcomes and the shared task
//! record.
//!
//! - [`Handle`] is the opaque, stable identifier returned by submission.
//! - [`TaskState`] is the scheduling state machine.
//! - [`Outcome`] is the value carried by a task's completion latch.
//! - [`TaskRecord`] is the shared, mostly-immutable part of a task; the
//!   mutable scheduling state lives in the registry under its lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::time::Duration;

use crate::cron::CronSchedule;

pub mod latch;

pub use latch::CompletionLatch;

/// Opaque task identifier.
///
/// Handles are non-zero, monotonically assigned in submission order, and
/// never reused for the scheduler's lifetime. The zero handle is
/// [`Handle::INVALID`] and is returned by submission APIs on rejected
/// submissions (unknown predecessor, malformed expression, zero interval).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// The "no such task" sentinel.
    pub const INVALID: Handle = Handle(0);

    pub(crate) fn new(id: u64) -> Self {
        Handle(id)
    }

    /// Raw numeric identifier (0 for the invalid handle).
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Whether this handle refers to an accepted submission.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Registered; waiting for its start instant and/or predecessors.
    Waiting,
    /// Selected by the dispatcher and queued to the worker pool, but not
    /// yet picked up by a worker.
    Ready,
    /// A worker is executing the task's thunk.
    Running,
    /// One-shot task finished successfully.
    Completed,
    /// One-shot task's thunk panicked.
    Failed,
    /// Cancelled before dispatch, or recurrence stopped, or scheduler
    /// shut down.
    Cancelled,
}

impl TaskState {
    /// Terminal states are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Result of a single fire, as observed through `wait` / `result`.
///
/// One-shot tasks settle exactly once. Recurring tasks get a fresh
/// `Pending` latch on every rearm; waiters who grabbed the previous latch
/// observe that fire's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No fire has completed yet.
    Pending,
    /// The thunk returned normally.
    Success,
    /// The thunk panicked; the payload is rendered into the cause string.
    Failed(String),
    /// The task was cancelled before (or instead of) firing.
    Cancelled,
}

impl Outcome {
    /// Whether the latch has been resolved (anything but `Pending`).
    pub fn is_settled(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

/// How (and whether) a task rearms after a fire.
#[derive(Debug, Clone)]
pub(crate) enum Recurrence {
    /// Fire once, then terminal.
    Once,
    /// Rearm at `completion instant + interval`.
    Every(Duration),
    /// Rearm at the calendar expression's next fire, recomputed from the
    /// wall clock after each run.
    Calendar(CronSchedule),
}

/// The user-supplied unit of work. `Fn` (not `FnOnce`) because recurring
/// tasks invoke it once per fire.
pub(crate) type Work = Box<dyn Fn() + Send + Sync + 'static>;

/// Shared, immutable-after-insert part of a task.
///
/// Everything the worker-side execution path needs lives here so that the
/// registry lock is never held across user code. The two atomics may be
/// mutated without the registry lock; all other per-task scheduling state
/// (state, start instant, dependents, latch) is owned by the registry.
pub(crate) struct TaskRecord {
    pub handle: Handle,
    pub work: Work,
    pub kind: Recurrence,
    /// Direct predecessors, frozen at submission.
    pub predecessors: Vec<Handle>,
    /// Predecessors that have not yet settled a fire. The task is
    /// time-eligible only at zero.
    pub pending_predecessors: AtomicUsize,
    /// Cancellation request flag. Checked by the dispatcher scan and
    /// re-checked by the worker immediately before running the thunk.
    pub cancelled: AtomicBool,
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("predecessors", &self.predecessors)
            .field("pending_predecessors", &self.pending_predecessors)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}
