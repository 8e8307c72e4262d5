// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Canonical activity model produced by the normalizer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sport type used when Keep reports none.
pub const UNKNOWN_SPORT: &str = "unknown";

/// One completed workout, normalized from a Keep log entry.
///
/// Constructed fresh each run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Keep workout ID (`stats.id`), absent for some legacy/merged entries
    pub source_id: Option<String>,
    /// Sport type (running, cycling, ropeSkipping, ...)
    pub sport_type: String,
    /// `stats.type` exactly as Keep reported it, independent of the query
    pub reported_type: Option<String>,
    /// Local calendar date of completion
    pub done_at: NaiveDate,
    /// Duration in seconds
    pub duration_seconds: f64,
    /// Distance in kilometers
    pub distance_km: f64,
    /// Energy in kcal
    pub calories: f64,
    /// Heart-rate summary; `None` means no sensor data
    pub heart_rate: Option<HeartRate>,
    /// App and device that recorded the workout
    pub vendor: Vendor,
    /// Track/map image, not yet validated
    pub track_image_url: Option<String>,
    /// Workout name as shown in Keep
    pub display_name: String,
    /// Name suffix (e.g. a course variant)
    pub display_suffix: String,
}

/// Heart-rate summary from a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRate {
    pub avg: f64,
    pub max: f64,
}

/// Recording app and device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    /// Source app (e.g. "Keep", "Huawei Health")
    pub source_app: String,
    /// Device model (e.g. "Apple Watch Series 9")
    pub device_model: Option<String>,
}
