// src/task/latch.rs

//! Completion latch: a one-shot, waitable cell holding a fire's [`Outcome`].
//!
//! For one-shot tasks the latch resolves exactly once. For recurring tasks
//! the registry replaces the latch with a fresh `Pending` one on rearm,
//! after the previous latch has been resolved with the finished fire's
//! outcome, so waiters who acquired the previous latch observe that
//! fire's result deterministically.

use parking_lot::{Condvar, Mutex};

use crate::task::Outcome;

/// Waitable outcome cell guarded by a mutex + condvar.
pub struct CompletionLatch {
    outcome: Mutex<Outcome>,
    settled: Condvar,
}

impl CompletionLatch {
    /// A fresh latch in the `Pending` state.
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(Outcome::Pending),
            settled: Condvar::new(),
        }
    }

    /// A latch born already resolved. Used when a recurring task's latch
    /// is replaced on a terminal transition (cancellation, end of
    /// schedule) so late waiters never block.
    pub fn resolved(outcome: Outcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            settled: Condvar::new(),
        }
    }

    /// Resolve the latch and wake all waiters. A latch resolves at most
    /// once; later calls are ignored.
    pub fn resolve(&self, outcome: Outcome) {
        let mut guard = self.outcome.lock();
        if guard.is_settled() {
            return;
        }
        *guard = outcome;
        drop(guard);
        self.settled.notify_all();
    }

    /// Block until the latch resolves, then return the outcome.
    pub fn wait(&self) -> Outcome {
        let mut guard = self.outcome.lock();
        while !guard.is_settled() {
            self.settled.wait(&mut guard);
        }
        guard.clone()
    }

    /// Non-blocking read of the current outcome.
    pub fn peek(&self) -> Outcome {
        self.outcome.lock().clone()
    }
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn peek_before_resolve_is_pending() {
        let latch = CompletionLatch::new();
        assert_eq!(latch.peek(), Outcome::Pending);
    }

    #[test]
    fn resolve_wakes_waiter() {
        let latch = Arc::new(CompletionLatch::new());
        let waiter = {
            let latch = latch.clone();
            std::thread::spawn(move || latch.wait())
        };
        std::thread::sleep(Duration::from_millis(20));
        latch.resolve(Outcome::Success);
        assert_eq!(waiter.join().unwrap(), Outcome::Success);
    }

    #[test]
    fn resolves_at_most_once() {
        let latch = CompletionLatch::new();
        latch.resolve(Outcome::Failed("first".into()));
        latch.resolve(Outcome::Success);
        assert_eq!(latch.peek(), Outcome::Failed("first".into()));
    }

    #[test]
    fn born_resolved_never_blocks() {
        let latch = CompletionLatch::resolved(Outcome::Cancelled);
        assert_eq!(latch.wait(), Outcome::Cancelled);
    }
}
