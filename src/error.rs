// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types shared by every sync boundary.
//!
//! Only `Auth` and a failed primary `Fetch` escalate to the process level.
//! Everything else is isolated to a single record and counted in the run
//! summary.

use crate::config::ConfigError;

/// Sync error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Keep fetch failed: {0}")]
    Fetch(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Destination query failed: {0}")]
    Index(String),

    #[error("Destination write failed: {0}")]
    Write(String),

    #[error("Destination rejected record: {0}")]
    Validation(String),

    #[error("Weather unavailable: {0}")]
    Enrichment(String),

    #[error("Track image invalid: {0}")]
    TrackAsset(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether the retry helper may try the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Fetch(_)
                | SyncError::RateLimited(_)
                | SyncError::Index(_)
                | SyncError::Enrichment(_)
        )
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Auth(_) | SyncError::Config(_))
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
