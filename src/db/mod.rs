// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Destination layer (Notion database).

pub mod memory;
pub mod notion;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::models::{DestinationRecord, SyncKey};

pub use memory::MemoryDb;
pub use notion::NotionDb;

/// Destination property names as constants.
///
/// These match the columns of the existing Keep workout database; the last
/// three are added by this tool.
pub mod properties {
    pub const NAME: &str = "名称";
    pub const DATE: &str = "日期";
    pub const DURATION: &str = "时长";
    pub const DISTANCE: &str = "距离";
    pub const CALORIES: &str = "卡路里";
    pub const TYPE: &str = "类型";
    pub const PACE: &str = "平均配速";
    pub const AVG_HEART_RATE: &str = "平均心率";
    pub const WEATHER: &str = "天气";
    pub const VENDOR: &str = "数据来源";
    pub const MAX_HEART_RATE: &str = "最大心率";
    pub const TRACK: &str = "轨迹";
    /// Rendered `SyncKey` discriminant used for dedup lookups
    pub const SYNC_KEY: &str = "同步键";
}

/// The destination store: an index for dedup lookups and a sink for writes.
///
/// The store has no unique constraint of its own, so callers must serialize
/// `find_existing` and `create_record` for the same key.
#[async_trait]
pub trait Destination: Send + Sync {
    /// IDs of records stored under `key` (empty if none).
    async fn find_existing(&self, key: &SyncKey) -> Result<Vec<String>, SyncError>;

    /// Every key currently stored. Used to prefetch the index once per run.
    async fn list_keys(&self) -> Result<Vec<SyncKey>, SyncError>;

    /// Create a record and return its ID.
    async fn create_record(&self, record: &DestinationRecord) -> Result<String, SyncError>;
}
