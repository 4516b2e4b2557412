// src/registry/mod.rs

//! Task registry: owns every task for the scheduler's lifetime.
//!
//! One mutex protects the handle→slot map and all per-task scheduling
//! state: state transitions, start instants, reverse-edge (`dependents`)
//! appends and completion-latch replacement. The two atomics on
//! [`TaskRecord`] (`pending_predecessors`, `cancelled`) may be touched
//! without it. The lock is never held across a call into the worker pool
//! or into user code.
//!
//! Edges are stored as handles into the map, never as pointers, so the
//! back-pointer pattern (`dependents`) creates no ownership cycle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::task::{CompletionLatch, Handle, Outcome, Recurrence, TaskRecord, TaskState, Work};

/// Mutable per-task scheduling state, guarded by the registry mutex.
pub(crate) struct TaskSlot {
    pub record: Arc<TaskRecord>,
    pub state: TaskState,
    /// Earliest permissible start instant; `None` means never eligible
    /// again (a dispatched one-shot).
    pub start_at: Option<Instant>,
    /// Reverse edges, appended when later tasks name this one as a
    /// predecessor.
    pub dependents: Vec<Handle>,
    /// Watermark into `dependents`: entries below it have already had
    /// their pending counter decremented by this task. `dependents` is
    /// append-only, so one settle per edge is exactly one decrement even
    /// when a recurring task fires many times.
    pub notified_dependents: usize,
    /// Latch for the current (or final) fire. Replaced with a fresh
    /// `Pending` latch on recurring rearm, after being resolved.
    pub latch: Arc<CompletionLatch>,
}

pub(crate) struct RegistryInner {
    /// Handle id → slot. A `BTreeMap` so scans iterate handle-ascending,
    /// which fixes the dispatch tie-break order.
    pub slots: BTreeMap<u64, TaskSlot>,
    next_id: u64,
}

/// Handle-addressed arena of task slots behind a single mutex.
pub(crate) struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                slots: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Lock the registry for a dispatcher scan or a rearm.
    pub fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock()
    }

    /// Register a task: assign the next handle, wire reverse edges into
    /// every predecessor, initialise the pending-predecessor counter and
    /// install the slot. Unknown predecessor handles reject the whole
    /// submission with [`Handle::INVALID`] and no side effect.
    pub fn insert(
        &self,
        work: Work,
        kind: Recurrence,
        start_at: Instant,
        predecessors: &[Handle],
    ) -> Handle {
        let mut inner = self.inner.lock();

        let mut preds: Vec<Handle> = Vec::with_capacity(predecessors.len());
        for p in predecessors {
            if !inner.slots.contains_key(&p.id()) {
                warn!(predecessor = %p, "unknown predecessor handle; rejecting submission");
                return Handle::INVALID;
            }
            if !preds.contains(p) {
                preds.push(*p);
            }
        }

        let handle = Handle::new(inner.next_id);
        inner.next_id += 1;

        // Invariant: the counter reflects predecessors that have not yet
        // reached a terminal state. A predecessor that already settled
        // will never decrement this task again.
        let pending = preds
            .iter()
            .filter(|p| {
                inner
                    .slots
                    .get(&p.id())
                    .is_some_and(|slot| !slot.state.is_terminal())
            })
            .count();

        for p in &preds {
            if let Some(slot) = inner.slots.get_mut(&p.id()) {
                slot.dependents.push(handle);
            }
        }

        let record = Arc::new(TaskRecord {
            handle,
            work,
            kind,
            predecessors: preds,
            pending_predecessors: AtomicUsize::new(pending),
            cancelled: AtomicBool::new(false),
        });

        debug!(
            task = %handle,
            predecessors = record.predecessors.len(),
            pending,
            "registered task"
        );

        inner.slots.insert(
            handle.id(),
            TaskSlot {
                record,
                state: TaskState::Waiting,
                start_at: Some(start_at),
                dependents: Vec::new(),
                notified_dependents: 0,
                latch: Arc::new(CompletionLatch::new()),
            },
        );

        handle
    }

    /// Current latch of a task, for `wait` / `result`.
    pub fn latch_of(&self, handle: Handle) -> Option<Arc<CompletionLatch>> {
        self.inner
            .lock()
            .slots
            .get(&handle.id())
            .map(|slot| slot.latch.clone())
    }

    /// Diagnostic read of a task's scheduling state.
    pub fn status_of(&self, handle: Handle) -> Option<TaskState> {
        self.inner
            .lock()
            .slots
            .get(&handle.id())
            .map(|slot| slot.state)
    }

    /// Request cancellation. Terminal tasks are left untouched; for
    /// everything else only the atomic flag is set. A `Waiting` task is
    /// swept to `Cancelled` by the dispatcher's next scan, a `Running`
    /// one finishes its current fire but never rearms.
    ///
    /// Returns `None` for unknown handles.
    pub fn mark_cancelled(&self, handle: Handle) -> Option<()> {
        let inner = self.inner.lock();
        let slot = inner.slots.get(&handle.id())?;
        if !slot.state.is_terminal() {
            slot.record.cancelled.store(true, Ordering::Release);
            debug!(task = %handle, "cancellation requested");
        }
        Some(())
    }

    /// Transition every non-terminal task to `Cancelled` and resolve its
    /// latch. Called once, on scheduler shutdown, after the pool has
    /// drained.
    pub fn cancel_all(&self) {
        let mut inner = self.inner.lock();
        for slot in inner.slots.values_mut() {
            if slot.state.is_terminal() {
                continue;
            }
            slot.record.cancelled.store(true, Ordering::Release);
            slot.state = TaskState::Cancelled;
            slot.latch.resolve(Outcome::Cancelled);
        }
    }
}

/// Settle the edges of a task that just finished a fire (or was
/// cancelled): decrement the pending-predecessor counter of every
/// dependent this task has not yet notified, and advance the watermark.
/// A recurring task fires repeatedly, but each dependent edge is
/// decremented at most once, so a dependent joining on several
/// predecessors waits for each of them. Returns `true` when some
/// dependent's counter newly reached zero.
///
/// Must run in the same critical section as the state transition it
/// accompanies, so that `insert`'s pending count stays consistent with
/// which predecessors have already settled.
pub(crate) fn settle_dependents(inner: &mut RegistryInner, handle: Handle) -> bool {
    let to_notify: Vec<Handle> = match inner.slots.get_mut(&handle.id()) {
        Some(slot) => {
            let fresh = slot.dependents[slot.notified_dependents..].to_vec();
            slot.notified_dependents = slot.dependents.len();
            fresh
        }
        None => return false,
    };

    let mut newly_eligible = false;
    for d in to_notify {
        if let Some(slot) = inner.slots.get(&d.id()) {
            let prev = slot.record.pending_predecessors.fetch_update(
                Ordering::AcqRel,
                Ordering::Acquire,
                |n| n.checked_sub(1),
            );
            if prev == Ok(1) {
                debug!(task = %d, "all predecessors settled");
                newly_eligible = true;
            }
        }
    }
    newly_eligible
}
