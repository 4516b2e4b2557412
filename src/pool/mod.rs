// src/pool/mod.rs

//! Bounded FIFO worker pool.
//!
//! N OS threads share one queue of boxed jobs behind a mutex + condvar.
//! The pool has no notion of tasks, dependencies or time; the scheduler is
//! its only production caller. Job panics are caught and suppressed here
//! (the scheduler layer records them on the task's completion latch before
//! the job returns, so from the pool's viewpoint every job finishes
//! normally).

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolInner {
    queue: VecDeque<Job>,
    shutdown: bool,
}

struct PoolState {
    inner: Mutex<PoolInner>,
    work_ready: Condvar,
}

/// Fixed-size thread pool with FIFO submission.
pub struct WorkerPool {
    state: Arc<PoolState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `workers` threads (at least one) waiting on the shared queue.
    pub fn new(workers: usize) -> Self {
        let state = Arc::new(PoolState {
            inner: Mutex::new(PoolInner {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            work_ready: Condvar::new(),
        });

        let workers = workers.max(1);
        let handles = (0..workers)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || worker_loop(state))
            })
            .collect();

        debug!(workers, "worker pool started");

        Self {
            state,
            workers: Mutex::new(handles),
        }
    }

    /// Append a job to the queue. O(1); a silent no-op after shutdown.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        {
            let mut inner = self.state.inner.lock();
            if inner.shutdown {
                return;
            }
            inner.queue.push_back(Box::new(job));
        }
        self.state.work_ready.notify_one();
    }

    /// Stop the pool and join every worker. Queued jobs are drained before
    /// the workers exit; after this returns no worker thread is alive.
    /// Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.state.inner.lock();
            if inner.shutdown {
                return;
            }
            inner.shutdown = true;
        }
        self.state.work_ready.notify_all();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(state: Arc<PoolState>) {
    loop {
        let job = {
            let mut inner = state.inner.lock();
            loop {
                if let Some(job) = inner.queue.pop_front() {
                    break job;
                }
                if inner.shutdown {
                    return;
                }
                state.work_ready.wait(&mut inner);
            }
        };

        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("worker job panicked; suppressed at the pool layer");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn runs_enqueued_jobs() {
        let pool = WorkerPool::new(2);
        let (tx, rx) = mpsc::channel();
        pool.enqueue(move || tx.send(7usize).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        pool.shutdown();
    }

    #[test]
    fn single_worker_preserves_fifo_order() {
        let pool = WorkerPool::new(1);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            pool.enqueue(move || seen.lock().push(i));
        }
        pool.shutdown();
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn shutdown_drains_the_queue() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.enqueue(move || {
                std::thread::sleep(Duration::from_millis(2));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn enqueue_after_shutdown_is_a_noop() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = counter.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn a_panicking_job_does_not_kill_the_worker() {
        let pool = WorkerPool::new(1);
        pool.enqueue(|| panic!("boom"));
        let (tx, rx) = mpsc::channel();
        pool.enqueue(move || tx.send(()).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        pool.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let pool = WorkerPool::new(2);
        pool.shutdown();
        pool.shutdown();
    }
}
