// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notion database client.
//!
//! Provides:
//! - Dedup lookups by `(日期, 同步键)`
//! - Bulk listing of stored keys (paged)
//! - Page creation with an optional external cover image

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::db::{properties, Destination};
use crate::error::SyncError;
use crate::models::{DestinationRecord, SyncKey};
use crate::time_utils::format_date;

const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// Notion database client.
#[derive(Clone)]
pub struct NotionDb {
    http: reqwest::Client,
    base_url: String,
    token: String,
    database_id: String,
}

/// Which side of the store a failed call was on.
#[derive(Clone, Copy)]
enum Side {
    Query,
    Create,
}

impl NotionDb {
    pub fn new(
        base_url: &str,
        token: &str,
        database_id: &str,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            database_id: database_id.to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &Value, side: Side) -> Result<Value, SyncError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| match side {
                Side::Query => SyncError::Index(e.to_string()),
                Side::Create => SyncError::Write(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = notion_message(&body).unwrap_or(body);

            return Err(match (status.as_u16(), side) {
                (429, _) => {
                    tracing::warn!("Notion rate limit hit (429)");
                    SyncError::RateLimited("notion".to_string())
                }
                (400, _) => SyncError::Validation(message),
                (_, Side::Query) => SyncError::Index(format!("HTTP {}: {}", status, message)),
                (_, Side::Create) => SyncError::Write(format!("HTTP {}: {}", status, message)),
            });
        }

        response.json().await.map_err(|e| match side {
            Side::Query => SyncError::Index(format!("JSON parse error: {}", e)),
            Side::Create => SyncError::Write(format!("JSON parse error: {}", e)),
        })
    }

    fn query_path(&self) -> String {
        format!("/v1/databases/{}/query", self.database_id)
    }
}

#[async_trait]
impl Destination for NotionDb {
    async fn find_existing(&self, key: &SyncKey) -> Result<Vec<String>, SyncError> {
        let body = json!({
            "filter": {
                "and": [
                    { "property": properties::DATE, "date": { "equals": format_date(key.date) } },
                    {
                        "property": properties::SYNC_KEY,
                        "rich_text": { "equals": key.discriminant.to_string() }
                    }
                ]
            },
            "page_size": 10
        });

        let response = self.post_json(&self.query_path(), &body, Side::Query).await?;

        Ok(response
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_keys(&self) -> Result<Vec<SyncKey>, SyncError> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "filter": { "property": properties::SYNC_KEY, "rich_text": { "is_not_empty": true } },
                "page_size": PAGE_SIZE
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let response = self.post_json(&self.query_path(), &body, Side::Query).await?;

            if let Some(results) = response.get("results").and_then(Value::as_array) {
                keys.extend(results.iter().filter_map(key_from_page));
            }

            let has_more = response
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let next = response
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);

            match next {
                Some(n) if has_more && cursor.as_deref() != Some(n.as_str()) => cursor = Some(n),
                _ => break,
            }
        }

        tracing::info!(count = keys.len(), "Listed existing Notion records");
        Ok(keys)
    }

    async fn create_record(&self, record: &DestinationRecord) -> Result<String, SyncError> {
        let mut body = json!({
            "parent": { "database_id": self.database_id },
            "properties": record_properties(record),
        });
        if let Some(url) = &record.track_image {
            body["cover"] = json!({ "type": "external", "external": { "url": url } });
        }

        let response = self.post_json("/v1/pages", &body, Side::Create).await?;

        response
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SyncError::Write("Create response contained no page id".to_string()))
    }
}

/// Build the Notion `properties` object for a record.
pub fn record_properties(record: &DestinationRecord) -> Value {
    let mut props = Map::new();

    props.insert(
        properties::NAME.to_string(),
        json!({ "title": [{ "text": { "content": record.title } }] }),
    );
    props.insert(
        properties::DATE.to_string(),
        json!({ "date": { "start": format_date(record.date) } }),
    );
    props.insert(properties::DURATION.to_string(), number(record.duration));
    props.insert(properties::DISTANCE.to_string(), number(record.distance));
    props.insert(properties::CALORIES.to_string(), number(record.calories));
    props.insert(properties::TYPE.to_string(), rich_text(&record.sport_type));
    props.insert(properties::PACE.to_string(), json!({ "number": record.pace }));
    props.insert(properties::AVG_HEART_RATE.to_string(), number(record.avg_heart_rate));
    props.insert(properties::MAX_HEART_RATE.to_string(), number(record.max_heart_rate));
    props.insert(properties::VENDOR.to_string(), rich_text(&record.vendor));
    props.insert(properties::WEATHER.to_string(), rich_text(&record.weather));
    props.insert(
        properties::SYNC_KEY.to_string(),
        rich_text(&record.key.discriminant.to_string()),
    );
    if let Some(url) = &record.track_image {
        props.insert(properties::TRACK.to_string(), json!({ "url": url }));
    }

    Value::Object(props)
}

fn number(v: f64) -> Value {
    json!({ "number": v })
}

fn rich_text(s: &str) -> Value {
    if s.is_empty() {
        json!({ "rich_text": [] })
    } else {
        json!({ "rich_text": [{ "text": { "content": s } }] })
    }
}

/// Read `(日期, 同步键)` back out of a page object.
fn key_from_page(page: &Value) -> Option<SyncKey> {
    let props = page.get("properties")?;
    let date = props
        .pointer(&format!("/{}/date/start", properties::DATE))
        .and_then(Value::as_str)?;
    let text: String = props
        .pointer(&format!("/{}/rich_text", properties::SYNC_KEY))
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|t| {
            t.get("plain_text")
                .or_else(|| t.pointer("/text/content"))
                .and_then(Value::as_str)
        })
        .collect();
    SyncKey::parse(date, &text)
}

fn notion_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}
