// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Dedup identity for destination records.
//!
//! A `SyncKey` is a calendar date plus a discriminant. Activities with a
//! well-formed Keep ID use it directly. Activities without one get a
//! content hash over the fields Keep itself reported, so two distinct
//! workouts of the same sport on the same day never collapse into one key.
//! The query tag a group was fetched under is not part of the hash.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::models::Activity;
use crate::time_utils::format_date;

/// Longest Keep ID accepted as a strong identifier.
const MAX_SOURCE_ID_LEN: usize = 128;

/// Bytes of the SHA-256 digest kept in a content-hash key.
const CONTENT_HASH_BYTES: usize = 16;

/// Identity of one destination record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncKey {
    pub date: NaiveDate,
    pub discriminant: Discriminant,
}

/// The part of a `SyncKey` that tells records on the same date apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Discriminant {
    /// Well-formed Keep workout ID.
    SourceId(String),
    /// Fallback for records without a usable ID. Weaker than `SourceId`.
    ContentHash(String),
    /// Entries created by this tool itself (e.g. the daily weather page).
    Synthetic(String),
}

impl SyncKey {
    pub fn new(date: NaiveDate, discriminant: Discriminant) -> Self {
        Self { date, discriminant }
    }

    /// Compute the key for a normalized activity.
    pub fn for_activity(activity: &Activity) -> Self {
        let discriminant = match activity.source_id.as_deref().map(str::trim) {
            Some(id) if is_well_formed_id(id) => Discriminant::SourceId(id.to_string()),
            _ => Discriminant::ContentHash(content_hash(activity)),
        };
        Self::new(activity.done_at, discriminant)
    }

    /// Whether this key falls back to a content hash.
    pub fn is_weak(&self) -> bool {
        matches!(self.discriminant, Discriminant::ContentHash(_))
    }

    /// Rebuild a key from the stored date and discriminant text.
    pub fn parse(date: &str, discriminant: &str) -> Option<Self> {
        let date = NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d").ok()?;
        Some(Self::new(date, Discriminant::parse(discriminant)?))
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", format_date(self.date), self.discriminant)
    }
}

impl Discriminant {
    /// Parse the stored text form back into a discriminant.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(id) = s.strip_prefix("keep:") {
            return is_well_formed_id(id).then(|| Discriminant::SourceId(id.to_string()));
        }
        if let Some(hash) = s.strip_prefix("hash:") {
            return (!hash.is_empty()).then(|| Discriminant::ContentHash(hash.to_string()));
        }
        Some(Discriminant::Synthetic(s.to_string()))
    }
}

impl fmt::Display for Discriminant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discriminant::SourceId(id) => write!(f, "keep:{}", id),
            Discriminant::ContentHash(hash) => write!(f, "hash:{}", hash),
            Discriminant::Synthetic(tag) => f.write_str(tag),
        }
    }
}

/// Keep IDs look like `5c8f..._1556..._rn`; anything else is untrusted.
fn is_well_formed_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SOURCE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
}

fn content_hash(activity: &Activity) -> String {
    let mut hasher = Sha256::new();
    // Unit separators keep adjacent fields from running together.
    for field in [
        format_date(activity.done_at),
        activity.reported_type.clone().unwrap_or_default(),
        format!("{:.0}", activity.duration_seconds),
        format!("{:.3}", activity.distance_km),
        format!("{:.0}", activity.calories),
        activity.display_name.clone(),
        activity.display_suffix.clone(),
    ] {
        hasher.update(field.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(&hasher.finalize()[..CONTENT_HASH_BYTES])
}
