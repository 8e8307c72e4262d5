// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Keep API client for logging in and fetching workout history.
//!
//! Handles:
//! - Mobile/password login (bearer token)
//! - Paged `stats/detail` queries, either aggregate or per sport type
//! - Retry with backoff at the boundary
//! - Fan-out fault isolation (one failing sport type is skipped)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FetchMode;
use crate::error::SyncError;
use crate::services::retry::RetryPolicy;
use crate::services::sync::CancelSignal;

/// Login credentials for Keep.
#[derive(Clone)]
pub struct Credentials {
    pub mobile: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("mobile", &self.mobile)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Authenticated Keep session.
#[derive(Clone)]
pub struct Session {
    token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Which workouts a query asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    All,
    Sport(String),
}

impl TypeFilter {
    fn as_query(&self) -> &str {
        match self {
            TypeFilter::All => "all",
            TypeFilter::Sport(t) => t,
        }
    }
}

/// One page of raw groups plus the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct ActivityPage {
    pub groups: Vec<RawGroup>,
    pub next_cursor: Option<i64>,
}

/// A group of logs as returned by `stats/detail` (typically one per day).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGroup {
    #[serde(deserialize_with = "lenient_logs")]
    pub logs: Vec<RawLog>,
}

/// A single log entry. `stats` is missing on some legacy entries.
///
/// `stats` stays untyped until normalization so one malformed entry
/// cannot poison the rest of its group.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLog {
    pub stats: Option<Value>,
}

/// Workout statistics block. Every field is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawStats {
    /// Usually a string, occasionally numeric on old entries
    pub id: Option<Value>,
    #[serde(rename = "type")]
    pub sport_type: Option<String>,
    pub name: Option<String>,
    pub name_suffix: Option<String>,
    /// RFC 3339 string, local timestamp, or epoch millis
    pub done_date: Option<Value>,
    pub duration: Option<f64>,
    pub km_distance: Option<f64>,
    pub calorie: Option<f64>,
    pub heart_rate: Option<RawHeartRate>,
    pub vendor: Option<RawVendor>,
    pub track_water_mark: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawHeartRate {
    pub average_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawVendor {
    pub source: Option<String>,
    pub device_model: Option<String>,
}

/// Deserialize `logs` one element at a time.
///
/// An element that is not a log object is kept as a log whose `stats` is
/// that element, so normalization reports it as malformed instead of the
/// whole group disappearing. A `logs` field that is not an array yields no
/// logs.
fn lenient_logs<'de, D>(deserializer: D) -> Result<Vec<RawLog>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            tracing::warn!(logs = %truncate(&other.to_string()), "Keep group logs is not an array");
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::Object(mut fields) => RawLog {
                stats: fields.remove("stats").filter(|s| !s.is_null()),
            },
            other => RawLog { stats: Some(other) },
        })
        .collect())
}

/// A raw group tagged with the sport type it was queried for.
///
/// The payload may omit or mis-report the type, so the query tag wins
/// when present.
#[derive(Debug, Clone)]
pub struct FetchedGroup {
    pub query_type: Option<String>,
    pub group: RawGroup,
}

/// Low-level source operations. `KeepClient` talks HTTP; tests plug in fakes.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Session, SyncError>;

    async fn list_activities(
        &self,
        session: &Session,
        type_filter: &TypeFilter,
        cursor: Option<i64>,
    ) -> Result<ActivityPage, SyncError>;
}

/// Keep HTTP client.
#[derive(Clone)]
pub struct KeepClient {
    http: reqwest::Client,
    base_url: String,
}

impl KeepClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check response status and parse the JSON envelope.
    async fn check_response_json(response: reqwest::Response) -> Result<Value, SyncError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Keep rate limit hit (429)");
                return Err(SyncError::RateLimited("keep".to_string()));
            }

            return Err(SyncError::Fetch(format!("HTTP {}: {}", status, truncate(&body))));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::Fetch(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl ActivitySource for KeepClient {
    async fn login(&self, credentials: &Credentials) -> Result<Session, SyncError> {
        let url = format!("{}/v1.1/users/login", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "mobile": credentials.mobile,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|e| SyncError::Fetch(format!("Login request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SyncError::Auth(format!("Login rejected with status {}", status)));
        }

        let body = Self::check_response_json(response).await?;

        body.pointer("/data/token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(Session::new)
            .ok_or_else(|| SyncError::Auth("Login response contained no token".to_string()))
    }

    async fn list_activities(
        &self,
        session: &Session,
        type_filter: &TypeFilter,
        cursor: Option<i64>,
    ) -> Result<ActivityPage, SyncError> {
        let url = format!("{}/pd/v3/stats/detail", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(session.token())
            .query(&[
                ("dateUnit", "all".to_string()),
                ("type", type_filter.as_query().to_string()),
                ("lastDate", cursor.unwrap_or(0).to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Fetch(e.to_string()))?;

        let body = Self::check_response_json(response).await?;
        parse_page(&body)
    }
}

/// Extract groups and cursor from a `stats/detail` body.
///
/// Groups that fail to deserialize are dropped here rather than failing the
/// whole page; their logs are simply never seen.
pub fn parse_page(body: &Value) -> Result<ActivityPage, SyncError> {
    let data = match body.get("data") {
        Some(Value::Object(data)) => data,
        Some(Value::Null) | None => return Ok(ActivityPage::default()),
        Some(other) => {
            return Err(SyncError::Fetch(format!(
                "Unexpected data field: {}",
                truncate(&other.to_string())
            )))
        }
    };

    let groups = data
        .get("records")
        .and_then(Value::as_array)
        .map(|records| {
            records
                .iter()
                .filter_map(|r| match serde_json::from_value::<RawGroup>(r.clone()) {
                    Ok(group) => Some(group),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping malformed Keep group");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let next_cursor = data
        .get("lastTimestamp")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .filter(|c| *c > 0);

    Ok(ActivityPage {
        groups,
        next_cursor,
    })
}

fn truncate(s: &str) -> String {
    const MAX: usize = 200;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(MAX).collect::<String>())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KeepService - authentication, paging, fan-out
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a full fetch.
#[derive(Debug, Default)]
pub struct FetchResult {
    /// Groups in the order received
    pub groups: Vec<FetchedGroup>,
    /// Sport types whose fan-out query failed
    pub failed_types: Vec<String>,
}

/// High-level Keep service: retries, pagination, per-type fan-out.
#[derive(Clone)]
pub struct KeepService {
    source: Arc<dyn ActivitySource>,
    retry: RetryPolicy,
    max_pages: u32,
}

impl KeepService {
    pub fn new(source: Arc<dyn ActivitySource>, retry: RetryPolicy, max_pages: u32) -> Self {
        Self {
            source,
            retry,
            max_pages: max_pages.max(1),
        }
    }

    /// Log in, retrying transport failures. A missing token is fatal.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session, SyncError> {
        let session = self
            .retry
            .execute("keep_login", || self.source.login(credentials))
            .await?;
        tracing::info!("Authenticated with Keep");
        Ok(session)
    }

    /// Fetch every group according to `mode`.
    ///
    /// `All` is the primary fetch: any failure after retries is returned.
    /// `PerType` logs and skips failing types, and fails only when every
    /// type failed.
    pub async fn fetch(
        &self,
        session: &Session,
        mode: FetchMode,
        sport_types: &[String],
        cancel: &CancelSignal,
    ) -> Result<FetchResult, SyncError> {
        match mode {
            FetchMode::All => {
                let groups = self.fetch_all_pages(session, &TypeFilter::All, cancel).await?;
                Ok(FetchResult {
                    groups: groups
                        .into_iter()
                        .map(|group| FetchedGroup {
                            query_type: None,
                            group,
                        })
                        .collect(),
                    failed_types: Vec::new(),
                })
            }
            FetchMode::PerType => self.fetch_per_type(session, sport_types, cancel).await,
        }
    }

    async fn fetch_per_type(
        &self,
        session: &Session,
        sport_types: &[String],
        cancel: &CancelSignal,
    ) -> Result<FetchResult, SyncError> {
        let mut result = FetchResult::default();
        let mut last_error = None;

        for sport in sport_types {
            if cancel.is_cancelled() {
                tracing::info!(sport = %sport, "Cancelled, not fetching remaining sport types");
                break;
            }

            let filter = TypeFilter::Sport(sport.clone());
            match self.fetch_all_pages(session, &filter, cancel).await {
                Ok(groups) => {
                    tracing::info!(sport = %sport, groups = groups.len(), "Fetched sport type");
                    result
                        .groups
                        .extend(groups.into_iter().map(|group| FetchedGroup {
                            query_type: Some(sport.clone()),
                            group,
                        }));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(sport = %sport, error = %e, "Sport type fetch failed, skipping");
                    result.failed_types.push(sport.clone());
                    last_error = Some(e);
                }
            }
        }

        if !sport_types.is_empty() && result.failed_types.len() == sport_types.len() {
            return Err(last_error
                .unwrap_or_else(|| SyncError::Fetch("every sport type failed".to_string())));
        }

        Ok(result)
    }

    async fn fetch_all_pages(
        &self,
        session: &Session,
        filter: &TypeFilter,
        cancel: &CancelSignal,
    ) -> Result<Vec<RawGroup>, SyncError> {
        let mut groups = Vec::new();
        let mut cursor: Option<i64> = None;

        for page in 0..self.max_pages {
            if cancel.is_cancelled() {
                tracing::info!(page, "Cancelled, stopping pagination");
                break;
            }

            let result = self
                .retry
                .execute("keep_list_activities", || {
                    self.source.list_activities(session, filter, cursor)
                })
                .await?;

            tracing::debug!(
                filter = filter.as_query(),
                page,
                groups = result.groups.len(),
                "Fetched Keep page"
            );

            let empty = result.groups.is_empty();
            groups.extend(result.groups);

            match result.next_cursor {
                Some(next) if !empty && Some(next) != cursor => cursor = Some(next),
                _ => return Ok(groups),
            }
        }

        tracing::warn!(
            filter = filter.as_query(),
            max_pages = self.max_pages,
            "Stopped at page cap"
        );
        Ok(groups)
    }
}
