// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use keep_notion_sync::config::FetchMode;
use keep_notion_sync::db::{Destination, MemoryDb};
use keep_notion_sync::error::SyncError;
use keep_notion_sync::models::{DestinationRecord, SyncKey};
use keep_notion_sync::services::keep::{
    ActivityPage, ActivitySource, Credentials, KeepService, RawGroup, RawLog, Session, TypeFilter,
};
use keep_notion_sync::services::weather::{CurrentWeather, DayForecast, WeatherProvider};
use keep_notion_sync::services::{
    AssetProbe, CancelHandle, RetryPolicy, SyncEngine, SyncOptions, WeatherService,
};
use keep_notion_sync::time_utils::{format_date, local_today, offset_from_minutes};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Offset used by every test (UTC+8).
#[allow(dead_code)]
pub fn offset() -> FixedOffset {
    offset_from_minutes(480)
}

#[allow(dead_code)]
pub fn today() -> NaiveDate {
    local_today(offset())
}

/// Retry policy with millisecond backoff.
#[allow(dead_code)]
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
}

#[allow(dead_code)]
pub fn credentials() -> Credentials {
    Credentials {
        mobile: "13800000000".to_string(),
        password: "secret".to_string(),
    }
}

/// A Keep `stats` block for a past workout.
#[allow(dead_code)]
pub fn stats(id: &str, sport: &str, date: &str) -> Value {
    json!({
        "id": id,
        "type": sport,
        "name": "户外跑步",
        "doneDate": date,
        "duration": 1800,
        "kmDistance": 6.0,
        "calorie": 420,
        "heartRate": null,
        "vendor": { "source": "Keep", "deviceModel": null }
    })
}

#[allow(dead_code)]
pub fn group(stats: Vec<Value>) -> RawGroup {
    RawGroup {
        logs: stats
            .into_iter()
            .map(|s| RawLog { stats: Some(s) })
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted Keep source
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory Keep: pages per query type, failures per type, call counts.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedSource {
    reject_login: bool,
    pages: HashMap<String, Vec<Vec<RawGroup>>>,
    failing: HashSet<String>,
    cancel_on_first_page: Mutex<Option<CancelHandle>>,
    pub login_calls: AtomicU32,
    pub list_calls: AtomicU32,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `pages` for `query_type` ("all" or a sport type).
    pub fn with_pages(mut self, query_type: &str, pages: Vec<Vec<RawGroup>>) -> Self {
        self.pages.insert(query_type.to_string(), pages);
        self
    }

    pub fn failing_type(mut self, query_type: &str) -> Self {
        self.failing.insert(query_type.to_string());
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Raise cancellation while the first page is being served.
    pub fn cancel_after_first_page(self, handle: CancelHandle) -> Self {
        if let Ok(mut slot) = self.cancel_on_first_page.lock() {
            *slot = Some(handle);
        }
        self
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivitySource for ScriptedSource {
    async fn login(&self, _credentials: &Credentials) -> Result<Session, SyncError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_login {
            return Err(SyncError::Auth("Login response contained no token".to_string()));
        }
        Ok(Session::new("test-token"))
    }

    async fn list_activities(
        &self,
        _session: &Session,
        type_filter: &TypeFilter,
        cursor: Option<i64>,
    ) -> Result<ActivityPage, SyncError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let query_type = match type_filter {
            TypeFilter::All => "all",
            TypeFilter::Sport(t) => t.as_str(),
        };
        if self.failing.contains(query_type) {
            return Err(SyncError::Fetch(format!("HTTP 500 for {}", query_type)));
        }

        if let Ok(mut slot) = self.cancel_on_first_page.lock() {
            if let Some(handle) = slot.take() {
                handle.cancel();
            }
        }

        let pages = match self.pages.get(query_type) {
            Some(pages) => pages,
            None => return Ok(ActivityPage::default()),
        };

        // Cursor N (1-based) addresses page N; no cursor is page 0.
        let index = cursor.unwrap_or(0) as usize;
        let groups = pages.get(index).cloned().unwrap_or_default();
        let next_cursor = if index + 1 < pages.len() {
            Some(index as i64 + 1)
        } else {
            None
        };

        Ok(ActivityPage {
            groups,
            next_cursor,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Weather and probe fakes
// ─────────────────────────────────────────────────────────────────────────────

/// Weather provider returning fixed conditions.
#[allow(dead_code)]
pub struct FixedWeather;

#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn current_weather(&self, _location_id: &str) -> Result<CurrentWeather, SyncError> {
        Ok(CurrentWeather {
            description: "晴".to_string(),
            temp_c: 21.0,
        })
    }

    async fn forecast_tomorrow(
        &self,
        _location_id: &str,
        _tomorrow: NaiveDate,
        _offset: FixedOffset,
    ) -> Result<DayForecast, SyncError> {
        Ok(DayForecast {
            description: "多云".to_string(),
            min_c: 15.0,
            max_c: 24.0,
        })
    }
}

/// Weather provider that always fails.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingWeather {
    pub calls: AtomicU32,
}

#[async_trait]
impl WeatherProvider for FailingWeather {
    async fn current_weather(&self, _location_id: &str) -> Result<CurrentWeather, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::Enrichment("connection refused".to_string()))
    }

    async fn forecast_tomorrow(
        &self,
        _location_id: &str,
        _tomorrow: NaiveDate,
        _offset: FixedOffset,
    ) -> Result<DayForecast, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::Enrichment("connection refused".to_string()))
    }
}

/// Probe that accepts every URL.
#[allow(dead_code)]
pub struct OkProbe;

#[async_trait]
impl AssetProbe for OkProbe {
    async fn probe(&self, _url: &str) -> Result<(), SyncError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Slow destination
// ─────────────────────────────────────────────────────────────────────────────

/// `MemoryDb` that sleeps inside every index query and create, so
/// concurrent records for one key interleave between find and create.
#[allow(dead_code)]
pub struct SlowDestination {
    pub inner: Arc<MemoryDb>,
    delay: Duration,
}

#[allow(dead_code)]
impl SlowDestination {
    pub fn new(inner: Arc<MemoryDb>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Destination for SlowDestination {
    async fn find_existing(&self, key: &SyncKey) -> Result<Vec<String>, SyncError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_existing(key).await
    }

    async fn list_keys(&self) -> Result<Vec<SyncKey>, SyncError> {
        self.inner.list_keys().await
    }

    async fn create_record(&self, record: &DestinationRecord) -> Result<String, SyncError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create_record(record).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine assembly
// ─────────────────────────────────────────────────────────────────────────────

#[allow(dead_code)]
pub fn options(mode: FetchMode, sport_types: &[&str]) -> SyncOptions {
    SyncOptions {
        workers: 4,
        fetch_mode: mode,
        sport_types: sport_types.iter().map(|s| s.to_string()).collect(),
        prefetch_index: false,
        location_id: "1798082".to_string(),
        utc_offset: offset(),
    }
}

/// Assemble an engine over fakes.
#[allow(dead_code)]
pub fn engine(
    source: Arc<ScriptedSource>,
    db: Arc<MemoryDb>,
    weather: Arc<dyn WeatherProvider>,
    options: SyncOptions,
) -> SyncEngine {
    engine_with_destination(source, db, weather, options)
}

/// Assemble an engine over any destination.
#[allow(dead_code)]
pub fn engine_with_destination(
    source: Arc<ScriptedSource>,
    destination: Arc<dyn Destination>,
    weather: Arc<dyn WeatherProvider>,
    options: SyncOptions,
) -> SyncEngine {
    let keep = KeepService::new(source, fast_retry(), 50);
    SyncEngine::new(
        keep,
        destination,
        WeatherService::new(weather, fast_retry(), offset()),
        Arc::new(OkProbe),
        fast_retry(),
        options,
    )
}

/// A date string for today in the test offset.
#[allow(dead_code)]
pub fn today_str() -> String {
    format_date(today())
}
