// SQLite-backed moderation store: quota counters and takedown snapshots.
//
// Tables:
// - quota_counters: one row per (provider, period), count of calls charged
// - snapshots: one row per removed (chat, message), with unix-millis expiry
//   and the media bytes copied before the delete, if any
//
// Every mutation is a single statement, so concurrent bot processes sharing
// the file never lose an increment or restore a snapshot twice.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

use crate::core::moderation::{
    ArtifactKind, PreservedMedia, QuotaPeriod, QuotaStore, Snapshot, SnapshotStore, StoreError,
};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[derive(Clone)]
pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quota_counters (
                provider TEXT NOT NULL,
                period TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (provider, period)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                sender_name TEXT NOT NULL,
                artifact_ref TEXT,
                artifact_kind TEXT,
                original_text TEXT,
                preserved_name TEXT,
                preserved_data BLOB,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_expires_at
                ON snapshots(expires_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        // Databases created before media was preserved lack these columns.
        let columns: Vec<String> = sqlx::query("SELECT name FROM pragma_table_info('snapshots')")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
            .iter()
            .map(|row| row.get("name"))
            .collect();
        for (column, ty) in [("preserved_name", "TEXT"), ("preserved_data", "BLOB")] {
            if !columns.iter().any(|c| c == column) {
                sqlx::query(&format!("ALTER TABLE snapshots ADD COLUMN {column} {ty}"))
                    .execute(&self.pool)
                    .await
                    .map_err(backend)?;
                tracing::info!(column, "Added snapshot column");
            }
        }

        Ok(())
    }
}

fn millis_to_utc(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("bad timestamp {}", millis)))
}

fn snapshot_from_row(row: &SqliteRow) -> Result<Snapshot, StoreError> {
    let kind: Option<String> = row.get("artifact_kind");
    let artifact_kind = match kind {
        Some(kind) => Some(
            ArtifactKind::parse(&kind)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown artifact kind {}", kind)))?,
        ),
        None => None,
    };

    let name: Option<String> = row.get("preserved_name");
    let data: Option<Vec<u8>> = row.get("preserved_data");
    let preserved = match (name, data) {
        (Some(file_name), Some(data)) => Some(PreservedMedia { file_name, data }),
        _ => None,
    };

    Ok(Snapshot {
        chat_id: row.get::<i64, _>("chat_id") as u64,
        message_id: row.get::<i64, _>("message_id") as u64,
        sender_name: row.get("sender_name"),
        artifact_ref: row.get("artifact_ref"),
        artifact_kind,
        original_text: row.get("original_text"),
        preserved,
        created_at: millis_to_utc(row.get("created_at"))?,
        expires_at: millis_to_utc(row.get("expires_at"))?,
    })
}

#[async_trait]
impl QuotaStore for SqliteModerationStore {
    async fn try_increment(
        &self,
        provider: &str,
        period: QuotaPeriod,
        limit: u64,
    ) -> Result<Option<u64>, StoreError> {
        // The conditional upsert is one statement: no row comes back when the
        // counter is already past the limit.
        let row = sqlx::query(
            r#"
            INSERT INTO quota_counters (provider, period, count)
            VALUES (?, ?, 1)
            ON CONFLICT(provider, period) DO UPDATE SET
                count = quota_counters.count + 1
            WHERE quota_counters.count <= ?
            RETURNING count
            "#,
        )
        .bind(provider)
        .bind(period.to_string())
        .bind(limit.min(i64::MAX as u64) as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|r| r.get::<i64, _>("count") as u64))
    }

    async fn count(&self, provider: &str, period: QuotaPeriod) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT count FROM quota_counters WHERE provider = ? AND period = ?")
            .bind(provider)
            .bind(period.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        Ok(row.map(|r| r.get::<i64, _>("count") as u64).unwrap_or(0))
    }
}

#[async_trait]
impl SnapshotStore for SqliteModerationStore {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (
                chat_id, message_id, sender_name, artifact_ref, artifact_kind,
                original_text, preserved_name, preserved_data, created_at, expires_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chat_id, message_id) DO UPDATE SET
                sender_name = excluded.sender_name,
                artifact_ref = excluded.artifact_ref,
                artifact_kind = excluded.artifact_kind,
                original_text = excluded.original_text,
                preserved_name = excluded.preserved_name,
                preserved_data = excluded.preserved_data,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(snapshot.chat_id as i64)
        .bind(snapshot.message_id as i64)
        .bind(&snapshot.sender_name)
        .bind(&snapshot.artifact_ref)
        .bind(snapshot.artifact_kind.map(|k| k.as_str()))
        .bind(&snapshot.original_text)
        .bind(snapshot.preserved.as_ref().map(|p| p.file_name.as_str()))
        .bind(snapshot.preserved.as_ref().map(|p| p.data.as_slice()))
        .bind(snapshot.created_at.timestamp_millis())
        .bind(snapshot.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, chat_id: u64, message_id: u64) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query("SELECT * FROM snapshots WHERE chat_id = ? AND message_id = ?")
            .bind(chat_id as i64)
            .bind(message_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn take(
        &self,
        chat_id: u64,
        message_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Snapshot>, StoreError> {
        // DELETE ... RETURNING hands the row to exactly one caller.
        let row = sqlx::query(
            r#"
            DELETE FROM snapshots
            WHERE chat_id = ? AND message_id = ?
            RETURNING *
            "#,
        )
        .bind(chat_id as i64)
        .bind(message_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row.as_ref().map(snapshot_from_row).transpose()? {
            Some(snapshot) if snapshot.is_expired(now) => {
                tracing::debug!(chat_id, message_id, "Snapshot already expired");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM snapshots WHERE expires_at < ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{Likelihood, ProviderBudget, QuotaLedger};
    use crate::infra::moderation::connect::{connect_with_retry, RetryPolicy};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> SqliteModerationStore {
        let path = dir.path().join("moderation.db");
        let pool = connect_with_retry(path.to_str().unwrap(), RetryPolicy::default())
            .await
            .unwrap();
        let store = SqliteModerationStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn snapshot(chat_id: u64, message_id: u64, expires_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            chat_id,
            message_id,
            sender_name: "mallory".into(),
            artifact_ref: Some("file-1".into()),
            artifact_kind: Some(ArtifactKind::Video),
            original_text: Some("look".into()),
            preserved: None,
            created_at: expires_at - ChronoDuration::hours(24),
            expires_at,
        }
    }

    fn period() -> QuotaPeriod {
        QuotaPeriod::containing(Utc.with_ymd_and_hms(2026, 5, 2, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn counter_starts_at_one_and_stops_past_limit() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        assert_eq!(store.try_increment("gcp", period(), 1).await.unwrap(), Some(1));
        assert_eq!(store.try_increment("gcp", period(), 1).await.unwrap(), Some(2));
        assert_eq!(store.try_increment("gcp", period(), 1).await.unwrap(), None);
        assert_eq!(store.count("gcp", period()).await.unwrap(), 2);
        assert_eq!(store.count("azure", period()).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let ledger = Arc::new(QuotaLedger::new(store.clone()));
        let budgets = Arc::new(vec![ProviderBudget {
            provider: "gcp".into(),
            monthly_limit: 9,
            threshold: Likelihood::Likely,
        }]);

        let mut handles = Vec::new();
        for _ in 0..24 {
            let ledger = Arc::clone(&ledger);
            let budgets = Arc::clone(&budgets);
            handles.push(tokio::spawn(async move {
                ledger.try_acquire(&budgets, Utc::now()).await.is_some()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 10);
        let now = QuotaPeriod::containing(Utc::now());
        assert_eq!(store.count("gcp", now).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn snapshot_take_is_single_use() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let now = Utc::now();
        let snap = snapshot(1, 2, now + ChronoDuration::hours(1));
        store.put(&snap).await.unwrap();

        let fetched = store.get(1, 2).await.unwrap().unwrap();
        assert_eq!(fetched.artifact_kind, Some(ArtifactKind::Video));
        assert_eq!(fetched.expires_at.timestamp_millis(), snap.expires_at.timestamp_millis());

        assert!(store.take(1, 2, now).await.unwrap().is_some());
        assert!(store.take(1, 2, now).await.unwrap().is_none());
        assert!(store.get(1, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_snapshot_is_removed_but_not_returned() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let now = Utc::now();
        store
            .put(&snapshot(1, 3, now - ChronoDuration::minutes(1)))
            .await
            .unwrap();

        assert!(store.take(1, 3, now).await.unwrap().is_none());
        assert!(store.get(1, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_respects_strict_boundary() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let cutoff = Utc.timestamp_millis_opt(1_800_000_000_000).unwrap();
        store
            .put(&snapshot(1, 1, cutoff - ChronoDuration::milliseconds(1)))
            .await
            .unwrap();
        store.put(&snapshot(1, 2, cutoff)).await.unwrap();
        store
            .put(&snapshot(1, 3, cutoff + ChronoDuration::hours(1)))
            .await
            .unwrap();

        assert_eq!(store.purge_expired(cutoff).await.unwrap(), 1);
        assert!(store.get(1, 1).await.unwrap().is_none());
        assert!(store.get(1, 2).await.unwrap().is_some());
        assert!(store.get(1, 3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn preserved_media_survives_the_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let now = Utc::now();
        let mut snap = snapshot(1, 4, now + ChronoDuration::hours(1));
        snap.preserved = Some(PreservedMedia {
            file_name: "clip.mp4".into(),
            data: vec![0, 1, 2, 255],
        });
        store.put(&snap).await.unwrap();

        let taken = store.take(1, 4, now).await.unwrap().unwrap();
        assert_eq!(taken.preserved, snap.preserved);
    }

    #[tokio::test]
    async fn migrate_adds_media_columns_to_older_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.db");
        let pool = connect_with_retry(path.to_str().unwrap(), RetryPolicy::default())
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE snapshots (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                sender_name TEXT NOT NULL,
                artifact_ref TEXT,
                artifact_kind TEXT,
                original_text TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = SqliteModerationStore::new(pool);
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();

        let snap = snapshot(2, 5, Utc::now() + ChronoDuration::hours(1));
        store.put(&snap).await.unwrap();
        assert!(store.get(2, 5).await.unwrap().unwrap().preserved.is_none());
    }
}
