// src/clock.rs

//! Clock plumbing: the monotonic source the scheduler loop runs on, the
//! wall clock the calendar side speaks, and the one-way conversion between
//! them.
//!
//! The conversion takes a paired snapshot `(wall_now, mono_now)` and maps
//! a wall target to `mono_now + (target - wall_now)`. It is lossy under
//! wall-clock jumps, which is why it is performed once per submission (and
//! once per rearm for calendar tasks) while the loop itself only ever
//! compares monotonic instants.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Format of the wall-clock submission string, local timezone.
const WALL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cap for wall targets so far ahead that the monotonic clock cannot
/// represent them.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Monotonic now. The scheduler loop uses this exclusively.
pub fn mono_now() -> Instant {
    Instant::now()
}

/// Wall-clock now, local timezone. Only the calendar side reads this.
pub fn wall_now() -> DateTime<Local> {
    Local::now()
}

/// Convert a wall-clock target to a monotonic instant via a paired
/// snapshot. Targets already in the past map to "now" (eligible on the
/// next dispatcher scan).
pub fn wall_to_monotonic(target: DateTime<Local>) -> Instant {
    let wall = wall_now();
    let mono = mono_now();
    match target.signed_duration_since(wall).to_std() {
        Ok(ahead) => mono
            .checked_add(ahead)
            .unwrap_or_else(|| mono + FAR_FUTURE),
        Err(_) => mono,
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` submission string in the local timezone.
///
/// Returns `None` for unparseable input and for local times that do not
/// exist (DST gap); ambiguous times resolve to the earlier instant.
pub fn parse_wall(s: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), WALL_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}
