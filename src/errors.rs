// src/errors.rs

//! Crate-wide error types.
//!
//! Submission APIs deliberately do not use these: a rejected submission is
//! surfaced synchronously as [`Handle::INVALID`](crate::task::Handle)
//! without side effect, and the reason is logged. Lookup-style APIs
//! (`wait`, `result`, `status`, `cancel`) report [`SchedulerError`].

use thiserror::Error;

use crate::task::Handle;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no such task handle: {0}")]
    UnknownHandle(Handle),
}

/// Why a calendar expression was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 whitespace-separated fields, got {0}")]
    FieldCount(usize),

    #[error("unparseable field: {0:?}")]
    BadField(String),

    #[error("field {field:?} out of range {min}..={max}")]
    OutOfRange { field: String, min: u32, max: u32 },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
