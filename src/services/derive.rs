// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Derived fields for destination records.
//!
//! Every function here is total: missing inputs map to a documented
//! default instead of an error.

use crate::models::{Activity, DestinationRecord, SyncKey};

/// Name used in titles when Keep gives none.
pub const DEFAULT_ACTIVITY_NAME: &str = "未命名";

/// Glyph for sport types outside the table.
pub const DEFAULT_EMOJI: &str = "🏋️";

/// Map a sport type to its title glyph.
pub fn emoji_for(sport_type: &str) -> &'static str {
    match sport_type {
        "running" => "🏃",
        "walking" => "🚶",
        "cycling" => "🚴",
        "swimming" => "🏊",
        "badminton" => "🏸",
        "basketball" => "🏀",
        "yoga" => "🧘",
        "ropeSkipping" => "🤾",
        _ => DEFAULT_EMOJI,
    }
}

/// Seconds per kilometer, rounded. 0 when there is no distance.
pub fn pace_seconds_per_km(duration_seconds: f64, distance_km: f64) -> u64 {
    if distance_km > 0.0 && duration_seconds.is_finite() && duration_seconds > 0.0 {
        (duration_seconds / distance_km).round() as u64
    } else {
        0
    }
}

/// `(avg, max)` heart rate, 0 when no sensor data.
pub fn heart_rate_summary(activity: &Activity) -> (f64, f64) {
    activity
        .heart_rate
        .map(|hr| (hr.avg, hr.max))
        .unwrap_or((0.0, 0.0))
}

/// "<source app> <device model>", trimmed.
pub fn vendor_label(activity: &Activity) -> String {
    format!(
        "{} {}",
        activity.vendor.source_app,
        activity.vendor.device_model.as_deref().unwrap_or("")
    )
    .trim()
    .to_string()
}

/// Emoji-prefixed title, e.g. "🏃 户外跑步 第 12 次".
pub fn display_title(activity: &Activity) -> String {
    let name = if activity.display_name.is_empty() {
        DEFAULT_ACTIVITY_NAME
    } else {
        activity.display_name.as_str()
    };
    format!(
        "{} {} {}",
        emoji_for(&activity.sport_type),
        name,
        activity.display_suffix
    )
    .trim_end()
    .to_string()
}

/// Project an activity and its enrichments into a destination record.
pub fn build_record(
    activity: &Activity,
    key: SyncKey,
    weather: String,
    track_image: Option<String>,
) -> DestinationRecord {
    let (avg_heart_rate, max_heart_rate) = heart_rate_summary(activity);

    DestinationRecord {
        key,
        title: display_title(activity),
        date: activity.done_at,
        duration: activity.duration_seconds,
        distance: activity.distance_km,
        calories: activity.calories,
        sport_type: activity.sport_type.clone(),
        pace: pace_seconds_per_km(activity.duration_seconds, activity.distance_km),
        avg_heart_rate,
        max_heart_rate,
        has_heart_rate: activity.heart_rate.is_some(),
        vendor: vendor_label(activity),
        weather,
        track_image,
    }
}
