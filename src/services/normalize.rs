// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Raw Keep log entries → canonical `Activity`.
//!
//! Pure functions. A malformed entry yields a `NormalizationSkip` value so
//! the rest of the batch keeps going.

use chrono::FixedOffset;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::models::{Activity, HeartRate, Vendor, UNKNOWN_SPORT};
use crate::services::keep::{FetchedGroup, RawLog, RawStats};
use crate::time_utils::parse_done_date;

/// Source app assumed when Keep omits the vendor block.
const DEFAULT_SOURCE_APP: &str = "Keep";

/// Why a log entry produced no activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationSkip {
    /// Log has no `stats` block (or it is null)
    MissingStats,
    /// `stats` exists but does not have the expected shape
    MalformedStats(String),
    /// `doneDate` is missing or unparseable
    MissingDate,
}

impl fmt::Display for NormalizationSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationSkip::MissingStats => f.write_str("missing stats"),
            NormalizationSkip::MalformedStats(e) => write!(f, "malformed stats: {}", e),
            NormalizationSkip::MissingDate => f.write_str("missing or unparseable doneDate"),
        }
    }
}

/// Normalize every log of a fetched group, preserving order.
pub fn normalize_group(
    fetched: &FetchedGroup,
    offset: FixedOffset,
) -> Vec<Result<Activity, NormalizationSkip>> {
    fetched
        .group
        .logs
        .iter()
        .map(|log| normalize_log(log, fetched.query_type.as_deref(), offset))
        .collect()
}

/// Normalize a single log entry.
///
/// `query_type` is the sport type the group was fetched under, if any; it
/// takes precedence over the payload's own `type`.
pub fn normalize_log(
    log: &RawLog,
    query_type: Option<&str>,
    offset: FixedOffset,
) -> Result<Activity, NormalizationSkip> {
    let raw = match &log.stats {
        None | Some(Value::Null) => return Err(NormalizationSkip::MissingStats),
        Some(value) => RawStats::deserialize(value)
            .map_err(|e| NormalizationSkip::MalformedStats(e.to_string()))?,
    };

    let done_at = raw
        .done_date
        .as_ref()
        .and_then(|v| parse_done_date(v, offset))
        .ok_or(NormalizationSkip::MissingDate)?;

    let reported_type = non_empty(raw.sport_type.as_deref());
    let sport_type = query_type
        .map(str::to_string)
        .or_else(|| reported_type.clone())
        .unwrap_or_else(|| UNKNOWN_SPORT.to_string());

    let heart_rate = raw.heart_rate.as_ref().and_then(|hr| {
        match (hr.average_heart_rate, hr.max_heart_rate) {
            (None, None) => None,
            (avg, max) => Some(HeartRate {
                avg: non_negative(avg),
                max: non_negative(max.or(avg)),
            }),
        }
    });

    let vendor = match &raw.vendor {
        Some(v) => Vendor {
            source_app: non_empty(v.source.as_deref())
                .unwrap_or_else(|| DEFAULT_SOURCE_APP.to_string()),
            device_model: non_empty(v.device_model.as_deref()),
        },
        None => Vendor {
            source_app: DEFAULT_SOURCE_APP.to_string(),
            device_model: None,
        },
    };

    Ok(Activity {
        source_id: raw.id.as_ref().and_then(id_to_string),
        sport_type,
        reported_type,
        done_at,
        duration_seconds: non_negative(raw.duration),
        distance_km: non_negative(raw.km_distance),
        calories: non_negative(raw.calorie),
        heart_rate,
        vendor,
        track_image_url: non_empty(raw.track_water_mark.as_deref()),
        display_name: raw.name.unwrap_or_default().trim().to_string(),
        display_suffix: raw.name_suffix.unwrap_or_default().trim().to_string(),
    })
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Missing, negative, and non-finite numbers all become 0.
fn non_negative(v: Option<f64>) -> f64 {
    match v {
        Some(x) if x.is_finite() && x > 0.0 => x,
        _ => 0.0,
    }
}
