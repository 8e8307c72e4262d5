// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync orchestration.
//!
//! One run is: authenticate, fetch every group, normalize in the order
//! received, then resolve/derive/enrich/write each activity on a bounded
//! pool. Only authentication and the primary fetch can abort a run; every
//! later failure is counted against its record.

use chrono::{FixedOffset, NaiveDate};
use futures_util::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::{Config, FetchMode};
use crate::db::Destination;
use crate::error::SyncError;
use crate::models::{Activity, DestinationRecord, Discriminant, SyncKey};
use crate::services::derive::build_record;
use crate::services::identity::{IdentityResolver, Resolution};
use crate::services::keep::{Credentials, KeepService};
use crate::services::normalize::normalize_group;
use crate::services::retry::RetryPolicy;
use crate::services::track::{validate_track_image, AssetProbe};
use crate::services::weather::WeatherService;

/// Discriminant tag of the daily weather page.
pub const WEATHER_PAGE_TAG: &str = "weather";

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Receiving side of the run-level cancellation flag.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side of the run-level cancellation flag.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Create a linked handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options and summary
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub workers: usize,
    pub fetch_mode: FetchMode,
    pub sport_types: Vec<String>,
    pub prefetch_index: bool,
    /// OpenWeather location for every record
    pub location_id: String,
    pub utc_offset: FixedOffset,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.workers.max(1),
            fetch_mode: config.fetch_mode,
            sport_types: config.sport_types.clone(),
            prefetch_index: config.prefetch_index,
            location_id: config.city_id.clone(),
            utc_offset: config.utc_offset(),
        }
    }
}

/// End-of-run counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Log entries received from Keep
    pub fetched: usize,
    /// Entries normalization could not use
    pub skipped: usize,
    /// Activities already in the destination
    pub duplicate: usize,
    pub written: usize,
    pub failed: usize,
    /// Activities never started because the run was cancelled
    pub cancelled: usize,
    /// Sport types whose fan-out fetch failed
    pub failed_types: Vec<String>,
}

impl SyncSummary {
    /// Final user-visible line for a completed run.
    pub fn report_line(&self) -> String {
        let mut line = format!(
            "sync completed: fetched {}, skipped {}, duplicate {}, written {}, failed {}, cancelled {}",
            self.fetched, self.skipped, self.duplicate, self.written, self.failed, self.cancelled
        );
        if self.failed > 0 {
            line.push_str(&format!(" (with {} failures)", self.failed));
        }
        line
    }

    fn tally(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Written => self.written += 1,
            RecordOutcome::Duplicate => self.duplicate += 1,
            RecordOutcome::Failed => self.failed += 1,
            RecordOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Final user-visible line for an aborted run.
pub fn aborted_line(error: &SyncError) -> String {
    format!("sync aborted before writing anything: {}", error)
}

/// What happened to one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Written,
    Duplicate,
    Failed,
    Cancelled,
}

/// Result of the daily weather page job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherPageOutcome {
    Created { page_id: String, weather: String },
    AlreadyExists,
}

impl fmt::Display for WeatherPageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeatherPageOutcome::Created { weather, .. } => {
                write!(f, "weather page created: {}", weather)
            }
            WeatherPageOutcome::AlreadyExists => f.write_str("weather page already exists"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SyncEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Drives Keep → Notion runs.
pub struct SyncEngine {
    keep: KeepService,
    destination: Arc<dyn Destination>,
    weather: WeatherService,
    probe: Arc<dyn AssetProbe>,
    /// Policy for index queries and rate-limited creates
    retry: RetryPolicy,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        keep: KeepService,
        destination: Arc<dyn Destination>,
        weather: WeatherService,
        probe: Arc<dyn AssetProbe>,
        retry: RetryPolicy,
        options: SyncOptions,
    ) -> Self {
        Self {
            keep,
            destination,
            weather,
            probe,
            retry,
            options,
        }
    }

    /// Run one full sync.
    ///
    /// Returns `Err` only when the run aborted before any write.
    pub async fn run(
        &self,
        credentials: &Credentials,
        cancel: &CancelSignal,
    ) -> Result<SyncSummary, SyncError> {
        let session = self.keep.authenticate(credentials).await?;

        let fetched = self
            .keep
            .fetch(
                &session,
                self.options.fetch_mode,
                &self.options.sport_types,
                cancel,
            )
            .await?;

        let mut summary = SyncSummary {
            failed_types: fetched.failed_types,
            ..SyncSummary::default()
        };

        let mut activities: Vec<Activity> = Vec::new();
        for group in &fetched.groups {
            for result in normalize_group(group, self.options.utc_offset) {
                summary.fetched += 1;
                match result {
                    Ok(activity) => activities.push(activity),
                    Err(reason) => {
                        summary.skipped += 1;
                        tracing::warn!(
                            query_type = group.query_type.as_deref().unwrap_or("all"),
                            reason = %reason,
                            "Skipping log entry"
                        );
                    }
                }
            }
        }

        tracing::info!(
            fetched = summary.fetched,
            activities = activities.len(),
            skipped = summary.skipped,
            "Normalized Keep logs"
        );

        let resolver = IdentityResolver::new(self.destination.clone(), self.retry.clone());
        if self.options.prefetch_index {
            if let Err(e) = resolver.prefetch().await {
                tracing::warn!(error = %e, "Index prefetch failed, querying per record");
            }
        }

        let outcomes = stream::iter(activities)
            .map(|activity| {
                let resolver = &resolver;
                async move { self.process_record(resolver, activity, cancel).await }
            })
            .buffer_unordered(self.options.workers.max(1))
            .collect::<Vec<RecordOutcome>>()
            .await;

        for outcome in outcomes {
            summary.tally(outcome);
        }

        tracing::info!(
            fetched = summary.fetched,
            skipped = summary.skipped,
            duplicate = summary.duplicate,
            written = summary.written,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Sync finished"
        );

        Ok(summary)
    }

    async fn process_record(
        &self,
        resolver: &IdentityResolver,
        activity: Activity,
        cancel: &CancelSignal,
    ) -> RecordOutcome {
        if cancel.is_cancelled() {
            return RecordOutcome::Cancelled;
        }

        let key = SyncKey::for_activity(&activity);
        let _guard = resolver.lock_key(&key).await;

        match resolver.resolve(&key).await {
            Ok(Resolution::Duplicate) => {
                tracing::debug!(sync_key = %key, "Already synced, skipping");
                return RecordOutcome::Duplicate;
            }
            Ok(Resolution::New) => {}
            Err(e) => {
                tracing::error!(sync_key = %key, error = %e, "Destination query failed");
                return RecordOutcome::Failed;
            }
        }

        let (track_image, weather) = tokio::join!(
            validate_track_image(&self.probe, activity.track_image_url.as_deref()),
            self.weather
                .weather_for(activity.done_at, &self.options.location_id),
        );

        if cancel.is_cancelled() {
            return RecordOutcome::Cancelled;
        }

        let record = build_record(&activity, key.clone(), weather, track_image);
        match self.write(&record).await {
            Ok(page_id) => {
                resolver.mark_written(&key);
                tracing::info!(sync_key = %key, page_id = %page_id, title = %record.title, "Synced activity");
                RecordOutcome::Written
            }
            Err(e) => {
                tracing::error!(
                    sync_key = %key,
                    title = %record.title,
                    error = %e,
                    "Failed to write activity"
                );
                RecordOutcome::Failed
            }
        }
    }

    /// Create a record, retrying only when rate limited.
    async fn write(&self, record: &DestinationRecord) -> Result<String, SyncError> {
        self.retry
            .execute_when(
                "destination_create",
                |e| matches!(e, SyncError::RateLimited(_)),
                || self.destination.create_record(record),
            )
            .await
    }

    /// Write the weather-only page for `date`, once per day.
    pub async fn write_weather_page(&self, date: NaiveDate) -> Result<WeatherPageOutcome, SyncError> {
        let key = SyncKey::new(date, Discriminant::Synthetic(WEATHER_PAGE_TAG.to_string()));
        let resolver = IdentityResolver::new(self.destination.clone(), self.retry.clone());
        let _guard = resolver.lock_key(&key).await;

        if resolver.resolve(&key).await? == Resolution::Duplicate {
            tracing::info!(sync_key = %key, "Weather page already exists");
            return Ok(WeatherPageOutcome::AlreadyExists);
        }

        let weather = self
            .weather
            .weather_for(date, &self.options.location_id)
            .await;
        let record = weather_page_record(key.clone(), weather.clone());
        let page_id = self.write(&record).await?;
        resolver.mark_written(&key);

        tracing::info!(sync_key = %key, page_id = %page_id, "Created weather page");
        Ok(WeatherPageOutcome::Created { page_id, weather })
    }
}

/// The weather-only record for a day.
pub fn weather_page_record(key: SyncKey, weather: String) -> DestinationRecord {
    DestinationRecord {
        title: format!("🌤️ {} 天气", key.date.format("%Y-%m-%d")),
        date: key.date,
        key,
        duration: 0.0,
        distance: 0.0,
        calories: 0.0,
        sport_type: "天气同步".to_string(),
        pace: 0,
        avg_heart_rate: 0.0,
        max_heart_rate: 0.0,
        has_heart_rate: false,
        vendor: "手动同步".to_string(),
        weather,
        track_image: None,
    }
}
