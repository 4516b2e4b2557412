// src/cron/mod.rs

//! Calendar-expression parsing and next-fire computation.
//!
//! Expressions are the whitespace-separated 5-field form
//! `minute hour day-of-month month day-of-week`, where each field is an
//! integer in its natural range ({0-59, 0-23, 1-31, 1-12, 0-6 with
//! 0 = Sunday}), `*`, or a step `*/k` with `k` in the field's range.
//!
//! [`next_fire`] honors all five fields: the result is the earliest
//! instant strictly after the input, at second zero, whose minute, hour,
//! day-of-month, month and day-of-week all match. When both day-of-month
//! and day-of-week are restricted, both must match. Schedules with no
//! fire inside a four-year horizon (impossible dates such as `0 0 30 2 *`)
//! yield `None`.

use chrono::{DateTime, Datelike, TimeDelta, TimeZone, Timelike};

use crate::errors::CronError;

/// One parsed field of a calendar expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    /// `*`: every value matches.
    Any,
    /// A single literal value.
    Exact(u32),
    /// `*/k`: every value congruent to the field's base, modulo `k`.
    Step(u32),
}

impl CronField {
    /// Whether `value` satisfies this field. `base` is the field's lowest
    /// natural value (0 for minute/hour/day-of-week, 1 for
    /// day-of-month/month).
    fn matches(&self, value: u32, base: u32) -> bool {
        match *self {
            CronField::Any => true,
            CronField::Exact(v) => value == v,
            CronField::Step(k) => (value - base) % k == 0,
        }
    }
}

/// A parsed 5-field calendar expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
}

impl CronSchedule {
    fn date_matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        self.month.matches(t.month(), 1)
            && self.day_of_month.matches(t.day(), 1)
            && self
                .day_of_week
                .matches(t.weekday().num_days_from_sunday(), 0)
    }
}

/// Parse a calendar expression.
pub fn parse(expr: &str) -> Result<CronSchedule, CronError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(CronError::FieldCount(fields.len()));
    }
    Ok(CronSchedule {
        minute: parse_field(fields[0], 0, 59)?,
        hour: parse_field(fields[1], 0, 23)?,
        day_of_month: parse_field(fields[2], 1, 31)?,
        month: parse_field(fields[3], 1, 12)?,
        day_of_week: parse_field(fields[4], 0, 6)?,
    })
}

fn parse_field(raw: &str, min: u32, max: u32) -> Result<CronField, CronError> {
    if raw == "*" {
        return Ok(CronField::Any);
    }
    if let Some(step) = raw.strip_prefix("*/") {
        let k: u32 = step
            .parse()
            .map_err(|_| CronError::BadField(raw.to_string()))?;
        // A zero step never advances; clamp the lower bound to 1.
        if k < min.max(1) || k > max {
            return Err(CronError::OutOfRange {
                field: raw.to_string(),
                min: min.max(1),
                max,
            });
        }
        return Ok(CronField::Step(k));
    }
    let v: u32 = raw
        .parse()
        .map_err(|_| CronError::BadField(raw.to_string()))?;
    if v < min || v > max {
        return Err(CronError::OutOfRange {
            field: raw.to_string(),
            min,
            max,
        });
    }
    Ok(CronField::Exact(v))
}

/// Upper bound on search iterations. Day-level skips mean a full scan of
/// the four-year horizon stays far below this.
const MAX_STEPS: u32 = 200_000;

/// Earliest instant strictly after `after` satisfying `schedule`, at
/// second zero. `None` if no fire exists within roughly four years.
pub fn next_fire<Tz: TimeZone>(
    schedule: &CronSchedule,
    after: DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let horizon = after.clone() + TimeDelta::days(366 * 4);
    let mut t = after
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(after)
        + TimeDelta::minutes(1);

    for _ in 0..MAX_STEPS {
        if t > horizon {
            return None;
        }
        if !schedule.date_matches(&t) {
            // Skip to the next local midnight. DST oddities (a skipped
            // midnight) fall back to minute stepping.
            let next_day = t.clone() + TimeDelta::days(1);
            t = next_day
                .with_hour(0)
                .and_then(|d| d.with_minute(0))
                .unwrap_or(t + TimeDelta::minutes(1));
            continue;
        }
        if !schedule.hour.matches(t.hour(), 0) {
            let next_hour = t.clone() + TimeDelta::hours(1);
            t = next_hour
                .with_minute(0)
                .unwrap_or(t + TimeDelta::minutes(1));
            continue;
        }
        if !schedule.minute.matches(t.minute(), 0) {
            t = t + TimeDelta::minutes(1);
            continue;
        }
        return Some(t);
    }
    None
}
