// src/lib.rs

//! In-process task scheduler: user-supplied thunks run on a fixed pool of
//! worker threads once their start instant has passed *and* every
//! predecessor in the dependency DAG has completed. Tasks are one-shot or
//! recurring (fixed interval or calendar expression).
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! use chronodag::{Outcome, Scheduler};
//!
//! let scheduler = Scheduler::new(4);
//! scheduler.start();
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! let extract = {
//!     let counter = counter.clone();
//!     scheduler.schedule_at(
//!         Instant::now() + Duration::from_millis(10),
//!         move || {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         },
//!         &[],
//!     )
//! };
//! let report = {
//!     let counter = counter.clone();
//!     scheduler.schedule_at(
//!         Instant::now(),
//!         move || {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         },
//!         &[extract], // runs only after `extract` completed
//!     )
//! };
//!
//! assert_eq!(scheduler.wait(report).unwrap(), Outcome::Success);
//! assert_eq!(counter.load(Ordering::SeqCst), 2);
//! scheduler.stop();
//! ```

pub mod clock;
pub mod cron;
pub mod errors;
pub mod logging;
pub mod pool;
mod registry;
pub mod scheduler;
pub mod task;

pub use errors::{CronError, Result, SchedulerError};
pub use scheduler::Scheduler;
pub use task::{Handle, Outcome, TaskState};
