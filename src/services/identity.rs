// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dedup resolution against the destination index.
//!
//! The destination has no unique constraint, so the check-then-write for a
//! key must happen under that key's lock:
//!
//! ```ignore
//! let _guard = resolver.lock_key(&key).await;
//! if resolver.resolve(&key).await? == Resolution::New {
//!     destination.create_record(&record).await?;
//!     resolver.mark_written(&key);
//! }
//! ```

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::Destination;
use crate::error::SyncError;
use crate::models::SyncKey;
use crate::services::retry::RetryPolicy;

/// Per-key mutexes serializing resolve→write.
pub type KeyLocks = Arc<DashMap<SyncKey, Arc<Mutex<()>>>>;

/// Outcome of a dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No record exists under the key yet
    New,
    /// A record already exists; skip it
    Duplicate,
}

/// Resolves keys to New/Duplicate for one run.
pub struct IdentityResolver {
    destination: Arc<dyn Destination>,
    retry: RetryPolicy,
    /// Keys known to be present in the destination
    known: DashSet<SyncKey>,
    /// Whether `known` holds a full snapshot of the destination
    prefetched: AtomicBool,
    key_locks: KeyLocks,
}

impl IdentityResolver {
    pub fn new(destination: Arc<dyn Destination>, retry: RetryPolicy) -> Self {
        Self {
            destination,
            retry,
            known: DashSet::new(),
            prefetched: AtomicBool::new(false),
            key_locks: Arc::new(DashMap::new()),
        }
    }

    /// Load every stored key once so later lookups need no query.
    ///
    /// Returns the number of keys loaded.
    pub async fn prefetch(&self) -> Result<usize, SyncError> {
        let keys = self
            .retry
            .execute("destination_list_keys", || self.destination.list_keys())
            .await?;

        let count = keys.len();
        for key in keys {
            self.known.insert(key);
        }
        self.prefetched.store(true, Ordering::SeqCst);

        tracing::info!(count, "Prefetched destination index");
        Ok(count)
    }

    /// Acquire the advisory lock for `key`.
    pub async fn lock_key(&self, key: &SyncKey) -> OwnedMutexGuard<()> {
        let lock = self
            .key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        lock.lock_owned().await
    }

    /// Decide whether `key` already has a destination record.
    ///
    /// Index query failures are retried, then returned to the caller.
    pub async fn resolve(&self, key: &SyncKey) -> Result<Resolution, SyncError> {
        if self.known.contains(key) {
            return Ok(Resolution::Duplicate);
        }

        if self.prefetched.load(Ordering::SeqCst) {
            return Ok(Resolution::New);
        }

        let existing = self
            .retry
            .execute("destination_find_existing", || {
                self.destination.find_existing(key)
            })
            .await?;

        if existing.is_empty() {
            if key.is_weak() {
                tracing::debug!(sync_key = %key, "No source id, resolved by content hash");
            }
            return Ok(Resolution::New);
        }

        if existing.len() > 1 {
            tracing::warn!(
                sync_key = %key,
                count = existing.len(),
                "Multiple destination records share one key"
            );
        }

        self.known.insert(key.clone());
        Ok(Resolution::Duplicate)
    }

    /// Record that `key` now exists in the destination.
    pub fn mark_written(&self, key: &SyncKey) {
        self.known.insert(key.clone());
    }
}
