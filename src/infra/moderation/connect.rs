// Store connection with bounded retry.
//
// Startup may race the volume or database coming up. We retry a fixed number
// of times with a doubling delay and then give up with `StoreError::Unavailable`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::core::moderation::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, StoreError> {
    let conn_str = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}", database_url)
    };

    let options = SqliteConnectOptions::from_str(&conn_str)
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    Ok(options)
}

/// The filesystem path behind a database URL, or `None` for in-memory databases.
fn database_path(database_url: &str) -> Option<&Path> {
    if database_url.contains(":memory:") {
        return None;
    }
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let path = path.split('?').next().unwrap_or(path);
    Some(Path::new(path))
}

/// Open a pool for `database_url`, retrying per `policy`.
pub async fn connect_with_retry(
    database_url: &str,
    policy: RetryPolicy,
) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = database_path(database_url).and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
    }

    let options = connect_options(database_url)?;
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Connected to moderation store");
                }
                return Ok(pool);
            }
            Err(e) => {
                last_error = e.to_string();
                if attempt < attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Store connection failed: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(StoreError::Unavailable {
        attempts,
        reason: last_error,
    })
}
