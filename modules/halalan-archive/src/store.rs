// SQLite persistence for fetched city datasets.
//
// The cache is an accelerator only: every failure here is logged and
// reported as a miss, and the whole file can be deleted at any time.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use halalan_common::{CacheKey, CityDataset};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{ArchiveError, Result};

const MEMORY_URL: &str = "sqlite::memory:";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS city_data (
        key       TEXT PRIMARY KEY NOT NULL,
        payload   TEXT,
        cached_at TEXT NOT NULL
    )
"#;

/// What the cache knows about a key. `payload IS NULL` rows are `Negative`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// Never attempted (or unreadable).
    Absent,
    /// Attempted and confirmed unavailable.
    Negative,
    Present(Arc<CityDataset>),
}

/// Durable key → dataset store, opened lazily on first use.
pub struct PersistentCache {
    url: String,
    pool: OnceCell<SqlitePool>,
}

impl PersistentCache {
    /// `url` is an sqlx SQLite URL, e.g. `sqlite://halalan-cache.db`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: OnceCell::new(),
        }
    }

    /// Process-local cache that vanishes with the handle.
    pub fn in_memory() -> Self {
        Self::new(MEMORY_URL)
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Open the pool and create the table if needed. Concurrent callers share
    /// one initialization; a failed open is retried by the next caller.
    pub async fn open(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let options = SqliteConnectOptions::from_str(&self.url)?
                    .create_if_missing(true)
                    .busy_timeout(Duration::from_secs(5));

                // Every connection to `:memory:` is its own database, so pin
                // a single connection for the lifetime of the pool.
                let pool = if self.is_memory() {
                    SqlitePoolOptions::new()
                        .max_connections(1)
                        .min_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                        .connect_with(options)
                        .await?
                } else {
                    SqlitePoolOptions::new()
                        .max_connections(4)
                        .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                        .await?
                };

                sqlx::query(CREATE_TABLE).execute(&pool).await?;
                info!(url = %self.url, "Persistent cache opened");
                Ok::<_, ArchiveError>(pool)
            })
            .await
    }

    /// Look up a key. Storage or decode failures degrade to `Absent`.
    pub async fn get(&self, key: &CacheKey) -> CacheEntry {
        match self.try_get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                CacheEntry::Absent
            }
        }
    }

    async fn try_get(&self, key: &CacheKey) -> Result<CacheEntry> {
        let pool = self.open().await?;
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT payload FROM city_data WHERE key = ?")
                .bind(key.as_str())
                .fetch_optional(pool)
                .await?;

        Ok(match row {
            None => CacheEntry::Absent,
            Some((None,)) => CacheEntry::Negative,
            Some((Some(payload),)) => CacheEntry::Present(Arc::new(serde_json::from_str(&payload)?)),
        })
    }

    /// Write-through upsert. `None` records a negative entry. Failures are
    /// logged and dropped.
    pub async fn put(&self, key: &CacheKey, value: Option<&CityDataset>) {
        if let Err(e) = self.try_put(key, value).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    async fn try_put(&self, key: &CacheKey, value: Option<&CityDataset>) -> Result<()> {
        let payload = value.map(serde_json::to_string).transpose()?;
        let pool = self.open().await?;
        sqlx::query(
            r#"
            INSERT INTO city_data (key, payload, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(key.as_str())
        .bind(payload)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Remove every entry. Returns how many rows were dropped.
    pub async fn clear(&self) -> Result<u64> {
        let pool = self.open().await?;
        let done = sqlx::query("DELETE FROM city_data").execute(pool).await?;
        info!(removed = done.rows_affected(), "Persistent cache cleared");
        Ok(done.rows_affected())
    }

    /// Number of stored entries, negative ones included.
    pub async fn len(&self) -> Result<u64> {
        let pool = self.open().await?;
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM city_data")
            .fetch_one(pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
