// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Track image validation.
//!
//! Keep's track images are sometimes empty, too long for Notion, or point
//! at resources that have already expired. A broken reference is dropped;
//! it never fails the record.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SyncError;

/// Notion rejects URLs longer than this.
pub const MAX_URL_LEN: usize = 2000;

/// Cheap existence check for a remote asset.
#[async_trait]
pub trait AssetProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), SyncError>;
}

/// HEAD-request probe with a short timeout.
#[derive(Clone)]
pub struct HttpAssetProbe {
    http: reqwest::Client,
}

impl HttpAssetProbe {
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl AssetProbe for HttpAssetProbe {
    async fn probe(&self, url: &str) -> Result<(), SyncError> {
        let response = self
            .http
            .head(url)
            .send()
            .await
            .map_err(|e| SyncError::TrackAsset(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::TrackAsset(format!("HTTP {}", response.status())))
        }
    }
}

/// Return the URL if it is usable, `None` otherwise.
pub async fn validate_track_image(probe: &Arc<dyn AssetProbe>, url: Option<&str>) -> Option<String> {
    let url = url.map(str::trim).filter(|u| !u.is_empty())?;

    if url.len() > MAX_URL_LEN {
        tracing::debug!(len = url.len(), "Track image URL too long, dropping");
        return None;
    }

    match probe.probe(url).await {
        Ok(()) => Some(url.to_string()),
        Err(e) => {
            tracing::info!(error = %e, "Track image unavailable, dropping");
            None
        }
    }
}
