// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time handling.
//!
//! Keep reports completion times in several shapes. Everything is reduced
//! to a calendar date in the configured local offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde_json::Value;

/// Build a fixed offset, falling back to UTC for out-of-range values.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// Today's calendar date in the given offset.
pub fn local_today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse Keep's `doneDate` into a local calendar date.
///
/// Accepts RFC 3339 strings, `YYYY-MM-DD HH:MM:SS` (already local),
/// bare `YYYY-MM-DD`, and epoch milliseconds (number or numeric string).
pub fn parse_done_date(value: &Value, offset: FixedOffset) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|ms| from_epoch_millis(ms, offset)),
        Value::String(s) => parse_done_date_str(s.trim(), offset),
        _ => None,
    }
}

fn parse_done_date_str(s: &str, offset: FixedOffset) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&offset).date_naive());
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    s.parse::<i64>()
        .ok()
        .and_then(|ms| from_epoch_millis(ms, offset))
}

fn from_epoch_millis(ms: i64, offset: FixedOffset) -> Option<NaiveDate> {
    if ms <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.with_timezone(&offset).date_naive())
}
