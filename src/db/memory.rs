// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory destination for offline runs and tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::db::Destination;
use crate::error::SyncError;
use crate::models::{DestinationRecord, SyncKey};

/// Destination backed by a `Vec`, with optional injected failures.
#[derive(Default)]
pub struct MemoryDb {
    records: Mutex<Vec<(String, DestinationRecord)>>,
    queries: AtomicU32,
    creates: AtomicU32,
    fail_queries: Mutex<Option<SyncError>>,
    fail_titles: Mutex<Vec<String>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with records already stored.
    pub fn with_records(records: Vec<DestinationRecord>) -> Self {
        let db = Self::default();
        if let Ok(mut stored) = db.records.lock() {
            for (i, r) in records.into_iter().enumerate() {
                stored.push((format!("seed-{}", i), r));
            }
        }
        db
    }

    /// Make every index query fail with `err` until cleared.
    pub fn fail_queries_with(&self, err: Option<SyncError>) {
        if let Ok(mut f) = self.fail_queries.lock() {
            *f = err;
        }
    }

    /// Reject creates for records with this title.
    pub fn reject_title(&self, title: &str) {
        if let Ok(mut f) = self.fail_titles.lock() {
            f.push(title.to_string());
        }
    }

    pub fn records(&self) -> Vec<DestinationRecord> {
        self.records
            .lock()
            .map(|r| r.iter().map(|(_, rec)| rec.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn query_count(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    fn injected_query_error(&self) -> Option<SyncError> {
        self.fail_queries.lock().ok().and_then(|f| match &*f {
            Some(SyncError::RateLimited(m)) => Some(SyncError::RateLimited(m.clone())),
            Some(SyncError::Validation(m)) => Some(SyncError::Validation(m.clone())),
            Some(e) => Some(SyncError::Index(e.to_string())),
            None => None,
        })
    }

    fn lock_err() -> SyncError {
        SyncError::Internal(anyhow::anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl Destination for MemoryDb {
    async fn find_existing(&self, key: &SyncKey) -> Result<Vec<String>, SyncError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.injected_query_error() {
            return Err(e);
        }

        let records = self.records.lock().map_err(|_| Self::lock_err())?;
        Ok(records
            .iter()
            .filter(|(_, r)| &r.key == key)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn list_keys(&self) -> Result<Vec<SyncKey>, SyncError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.injected_query_error() {
            return Err(e);
        }

        let records = self.records.lock().map_err(|_| Self::lock_err())?;
        Ok(records.iter().map(|(_, r)| r.key.clone()).collect())
    }

    async fn create_record(&self, record: &DestinationRecord) -> Result<String, SyncError> {
        self.creates.fetch_add(1, Ordering::SeqCst);

        let rejected = self
            .fail_titles
            .lock()
            .map(|f| f.iter().any(|t| t == &record.title))
            .unwrap_or(false);
        if rejected {
            return Err(SyncError::Validation(format!(
                "record '{}' rejected",
                record.title
            )));
        }

        let mut records = self.records.lock().map_err(|_| Self::lock_err())?;
        let id = format!("page-{}", records.len() + 1);
        records.push((id.clone(), record.clone()));
        Ok(id)
    }
}
