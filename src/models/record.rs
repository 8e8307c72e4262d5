// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Destination record written to the Notion database.

use chrono::NaiveDate;

use crate::models::SyncKey;

/// Write-once projection of an activity plus its derived fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRecord {
    /// Dedup identity, stored alongside the record
    pub key: SyncKey,
    /// Emoji-prefixed display title
    pub title: String,
    pub date: NaiveDate,
    /// Seconds
    pub duration: f64,
    /// Kilometers
    pub distance: f64,
    pub calories: f64,
    pub sport_type: String,
    /// Seconds per kilometer, 0 when distance is 0
    pub pace: u64,
    pub avg_heart_rate: f64,
    pub max_heart_rate: f64,
    /// False when the heart-rate numbers are placeholders, not readings
    pub has_heart_rate: bool,
    /// "<source app> <device model>"
    pub vendor: String,
    pub weather: String,
    /// Validated track image, used as the page cover as well
    pub track_image: Option<String>,
}
