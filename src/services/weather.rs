// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weather enrichment backed by OpenWeatherMap.
//!
//! Lookups are keyed by a configured city ID, never by activity
//! coordinates. `WeatherService::weather_for` never fails: any problem
//! produces `WEATHER_UNAVAILABLE`.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SyncError;
use crate::services::retry::RetryPolicy;
use crate::time_utils::local_today;

/// Text written when no weather could be obtained.
pub const WEATHER_UNAVAILABLE: &str = "天气数据不可用";

/// Current conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeather {
    pub description: String,
    pub temp_c: f64,
}

/// Aggregated forecast for one local calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayForecast {
    pub description: String,
    pub min_c: f64,
    pub max_c: f64,
}

impl CurrentWeather {
    pub fn summary(&self) -> String {
        format!("{} ~ {}°C", self.description, round1(self.temp_c))
    }
}

impl DayForecast {
    pub fn summary(&self) -> String {
        format!(
            "{} ~ {}~{}°C",
            self.description,
            round1(self.min_c),
            round1(self.max_c)
        )
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Weather boundary.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, location_id: &str) -> Result<CurrentWeather, SyncError>;

    /// Forecast for `tomorrow`, where the caller has already resolved
    /// "tomorrow" in its own local offset.
    async fn forecast_tomorrow(
        &self,
        location_id: &str,
        tomorrow: NaiveDate,
        offset: FixedOffset,
    ) -> Result<DayForecast, SyncError>;
}

/// OpenWeatherMap HTTP client.
#[derive(Clone)]
pub struct OpenWeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct CurrentResponse {
    main: MainBlock,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Deserialize)]
struct MainBlock {
    temp: f64,
}

#[derive(Deserialize)]
struct Condition {
    description: String,
}

#[derive(Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastSlot>,
}

#[derive(Deserialize)]
struct ForecastSlot {
    dt: i64,
    main: SlotMain,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Deserialize)]
struct SlotMain {
    temp_min: f64,
    temp_max: f64,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        location_id: &str,
    ) -> Result<T, SyncError> {
        let url = format!("{}/data/2.5/{}", self.base_url, endpoint);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("id", location_id),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("lang", "zh_cn"),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Enrichment(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(SyncError::RateLimited("openweather".to_string()));
            }
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Enrichment(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::Enrichment(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current_weather(&self, location_id: &str) -> Result<CurrentWeather, SyncError> {
        let body: CurrentResponse = self.get_json("weather", location_id).await?;

        Ok(CurrentWeather {
            description: body
                .weather
                .into_iter()
                .next()
                .map(|c| c.description)
                .unwrap_or_default(),
            temp_c: body.main.temp,
        })
    }

    async fn forecast_tomorrow(
        &self,
        location_id: &str,
        tomorrow: NaiveDate,
        offset: FixedOffset,
    ) -> Result<DayForecast, SyncError> {
        let body: ForecastResponse = self.get_json("forecast", location_id).await?;
        aggregate_forecast(&body.list, tomorrow, offset)
            .ok_or_else(|| SyncError::Enrichment(format!("No forecast slots for {}", tomorrow)))
    }
}

/// Fold 3-hour forecast slots falling on `day` (in `offset`) into one summary.
///
/// The description is the most frequent one; ties go to the earliest slot.
fn aggregate_forecast(
    slots: &[ForecastSlot],
    day: NaiveDate,
    offset: FixedOffset,
) -> Option<DayForecast> {
    let on_day: Vec<&ForecastSlot> = slots
        .iter()
        .filter(|s| {
            DateTime::<Utc>::from_timestamp(s.dt, 0)
                .map(|dt| dt.with_timezone(&offset).date_naive() == day)
                .unwrap_or(false)
        })
        .collect();

    if on_day.is_empty() {
        return None;
    }

    let min_c = on_day
        .iter()
        .map(|s| s.main.temp_min)
        .fold(f64::INFINITY, f64::min);
    let max_c = on_day
        .iter()
        .map(|s| s.main.temp_max)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for slot in &on_day {
        if let Some(c) = slot.weather.first() {
            match counts.iter_mut().find(|(d, _)| *d == c.description) {
                Some((_, n)) => *n += 1,
                None => counts.push((c.description.as_str(), 1)),
            }
        }
    }
    let description = counts
        .iter()
        .fold(None::<(&str, usize)>, |best, &(d, n)| match best {
            Some((_, bn)) if bn >= n => best,
            _ => Some((d, n)),
        })
        .map(|(d, _)| d.to_string())
        .unwrap_or_default();

    Some(DayForecast {
        description,
        min_c,
        max_c,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// WeatherService - date routing, retries, caching, sentinel
// ─────────────────────────────────────────────────────────────────────────────

/// Non-fatal weather lookups with a per-run cache.
#[derive(Clone)]
pub struct WeatherService {
    provider: Arc<dyn WeatherProvider>,
    retry: RetryPolicy,
    offset: FixedOffset,
    cache: Arc<DashMap<(NaiveDate, String), String>>,
}

impl WeatherService {
    pub fn new(provider: Arc<dyn WeatherProvider>, retry: RetryPolicy, offset: FixedOffset) -> Self {
        Self {
            provider,
            retry,
            offset,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Weather summary for `date` at `location_id`, or `WEATHER_UNAVAILABLE`.
    pub async fn weather_for(&self, date: NaiveDate, location_id: &str) -> String {
        let cache_key = (date, location_id.to_string());
        if let Some(cached) = self.cache.get(&cache_key) {
            return cached.clone();
        }

        let summary = match self.lookup(date, location_id).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::info!(
                    date = %date,
                    location = location_id,
                    error = %e,
                    "Weather unavailable, using sentinel"
                );
                WEATHER_UNAVAILABLE.to_string()
            }
        };

        self.cache.insert(cache_key, summary.clone());
        summary
    }

    /// Fallible lookup. Today uses current conditions, tomorrow the
    /// forecast; other dates have no source.
    pub async fn lookup(&self, date: NaiveDate, location_id: &str) -> Result<String, SyncError> {
        let today = local_today(self.offset);

        if date == today {
            let now = self
                .retry
                .execute("weather_current", || self.provider.current_weather(location_id))
                .await?;
            return Ok(now.summary());
        }

        if date == today + ChronoDuration::days(1) {
            let forecast = self
                .retry
                .execute("weather_forecast", || {
                    self.provider.forecast_tomorrow(location_id, date, self.offset)
                })
                .await?;
            return Ok(forecast.summary());
        }

        Err(SyncError::Enrichment(format!(
            "No weather source for {} (today is {})",
            date, today
        )))
    }
}
