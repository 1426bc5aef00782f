// Storage ports for the moderation subsystem.
//
// Snapshots and quota counters are the only shared mutable state. Both live
// behind these traits so several bot processes can share one backing store;
// nothing is cached in-process between tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::moderation_models::Snapshot;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("Storage unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
}

/// Trait for persisting takedown snapshots keyed by (chat, message).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert or replace the snapshot for its (chat, message) key.
    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Read a snapshot without consuming it.
    async fn get(&self, chat_id: u64, message_id: u64) -> Result<Option<Snapshot>, StoreError>;

    /// Atomically fetch and delete a snapshot. Of several concurrent callers
    /// for the same key at most one receives `Some`. Snapshots already past
    /// their expiry are removed but reported as `None`.
    async fn take(
        &self,
        chat_id: u64,
        message_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Snapshot>, StoreError>;

    /// Delete every snapshot with `expires_at < now`. Returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
