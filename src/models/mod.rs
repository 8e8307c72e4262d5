// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod record;
pub mod sync_key;

pub use activity::{Activity, HeartRate, Vendor, UNKNOWN_SPORT};
pub use record::DestinationRecord;
pub use sync_key::{Discriminant, SyncKey};
