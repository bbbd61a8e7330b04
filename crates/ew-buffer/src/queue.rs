use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::{BufferError, BufferResult};

/// One buffered row, oldest-first once dequeued.
#[derive(Debug, Clone)]
pub struct BufferedMessage {
    pub message_id: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferMetrics {
    pub queue_depth: u64,
    pub db_bytes: u64,
    pub evictions_total: u64,
}

/// Durable single-file queue backing the edge scheduler's offline
/// buffer. Idempotent by `message_id`,
/// FIFO by `created_at`, bounded by a byte quota enforced via
/// prune-oldest.
pub struct LocalBuffer {
    pool: SqlitePool,
    max_db_bytes: u64,
    evictions_total: std::sync::atomic::AtomicU64,
}

impl LocalBuffer {
    /// Opens (or creates) the buffer at `path`. If the existing file
    /// can't be parsed as SQLite, it is renamed to `<path>.corrupt-<unix>`
    /// and a fresh database is created in its place.
    pub async fn open(path: &Path, max_db_bytes: u64) -> BufferResult<Self> {
        match Self::try_open(path, max_db_bytes).await {
            Ok(buffer) => Ok(buffer),
            Err(_) => {
                Self::quarantine_corrupt_file(path)?;
                Self::try_open(path, max_db_bytes).await
            }
        }
    }

    fn quarantine_corrupt_file(path: &Path) -> BufferResult<()> {
        if path.exists() {
            let unix = Utc::now().timestamp();
            let corrupt_path = path.with_extension(format!("corrupt-{unix}"));
            std::fs::rename(path, corrupt_path)?;
            tracing::warn!(path = %path.display(), "local buffer file was corrupt, quarantined and recreating");
        }
        Ok(())
    }

    async fn try_open(path: &Path, max_db_bytes: u64) -> BufferResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA temp_store = MEMORY")
            .execute(&pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queue (
                message_id TEXT PRIMARY KEY,
                payload BLOB NOT NULL,
                created_at TEXT NOT NULL,
                byte_len INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_created_at ON queue(created_at)")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            max_db_bytes,
            evictions_total: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Idempotent insert (`INSERT OR IGNORE`). Enforces the byte quota
    /// via prune-oldest before insert; on disk-full, evicts the oldest
    /// row and retries once before giving up.
    pub async fn enqueue(
        &self,
        message_id: &str,
        payload: &[u8],
        created_at: DateTime<Utc>,
    ) -> BufferResult<bool> {
        self.enforce_quota_before_insert(payload.len() as u64).await?;

        match self.try_insert(message_id, payload, created_at).await {
            Ok(inserted) => Ok(inserted),
            Err(BufferError::Database(sqlx::Error::Database(db_err)))
                if db_err.message().contains("disk") || db_err.message().contains("full") =>
            {
                let evicted = self.evict_oldest(1).await?;
                self.evictions_total
                    .fetch_add(evicted, std::sync::atomic::Ordering::Relaxed);
                match self.try_insert(message_id, payload, created_at).await {
                    Ok(inserted) => Ok(inserted),
                    Err(_) => Err(BufferError::DiskFullAfterEviction { evicted }),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn try_insert(
        &self,
        message_id: &str,
        payload: &[u8],
        created_at: DateTime<Utc>,
    ) -> BufferResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO queue (message_id, payload, created_at, byte_len) VALUES (?, ?, ?, ?)",
        )
        .bind(message_id)
        .bind(payload)
        .bind(created_at.to_rfc3339())
        .bind(payload.len() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn enforce_quota_before_insert(&self, incoming_bytes: u64) -> BufferResult<()> {
        let current_bytes = self.db_bytes().await?;
        if current_bytes + incoming_bytes <= self.max_db_bytes {
            return Ok(());
        }
        let mut freed = 0u64;
        while current_bytes.saturating_sub(freed) + incoming_bytes > self.max_db_bytes {
            let evicted = self.evict_oldest(1).await?;
            if evicted == 0 {
                break;
            }
            self.evictions_total
                .fetch_add(evicted, std::sync::atomic::Ordering::Relaxed);
            freed += evicted;
        }
        Ok(())
    }

    async fn evict_oldest(&self, n: i64) -> BufferResult<u64> {
        let result = sqlx::query(
            "DELETE FROM queue WHERE message_id IN (
                SELECT message_id FROM queue ORDER BY created_at ASC LIMIT ?
            )",
        )
        .bind(n)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Oldest-first batch, used by the scheduler's flush step.
    pub async fn dequeue_batch(&self, limit: u32) -> BufferResult<Vec<BufferedMessage>> {
        let rows = sqlx::query(
            "SELECT message_id, payload, created_at FROM queue ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let created_at: String = row.try_get("created_at")?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| {
                        sqlx::Error::Decode(Box::new(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "invalid created_at",
                        )))
                    })?;
                Ok(BufferedMessage {
                    message_id: row.try_get("message_id")?,
                    payload: row.try_get("payload")?,
                    created_at,
                })
            })
            .collect()
    }

    pub async fn delete(&self, message_id: &str) -> BufferResult<()> {
        sqlx::query("DELETE FROM queue WHERE message_id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes rows beyond `max_messages` (oldest first) or older than
    /// `max_age_s`, returning the count removed.
    pub async fn prune(&self, max_messages: i64, max_age_s: i64) -> BufferResult<u64> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(max_age_s)).to_rfc3339();
        let by_age = sqlx::query("DELETE FROM queue WHERE created_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let by_count = sqlx::query(
            "DELETE FROM queue WHERE message_id IN (
                SELECT message_id FROM queue ORDER BY created_at DESC
                LIMIT -1 OFFSET ?
            )",
        )
        .bind(max_messages)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(by_age + by_count)
    }

    pub async fn db_bytes(&self) -> BufferResult<u64> {
        let row = sqlx::query("SELECT COALESCE(SUM(byte_len), 0) AS total FROM queue")
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
    }

    pub async fn metrics(&self) -> BufferResult<BufferMetrics> {
        let depth_row = sqlx::query("SELECT COUNT(*) AS n FROM queue")
            .fetch_one(&self.pool)
            .await?;
        let queue_depth: i64 = depth_row.try_get("n")?;
        Ok(BufferMetrics {
            queue_depth: queue_depth as u64,
            db_bytes: self.db_bytes().await?,
            evictions_total: self.evictions_total.load(std::sync::atomic::Ordering::Relaxed),
        })
    }

    pub fn path_for(base_dir: &Path) -> PathBuf {
        base_dir.join("edgewatch-buffer.sqlite")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, LocalBuffer) {
        let dir = tempfile::tempdir().unwrap();
        let path = LocalBuffer::path_for(dir.path());
        let buffer = LocalBuffer::open(&path, 10_000_000).await.unwrap();
        (dir, buffer)
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_on_message_id() {
        let (_dir, buffer) = open_temp().await;
        let now = Utc::now();
        assert!(buffer.enqueue("m-1", b"payload", now).await.unwrap());
        assert!(!buffer.enqueue("m-1", b"payload", now).await.unwrap());

        let metrics = buffer.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 1);
    }

    #[tokio::test]
    async fn dequeue_batch_is_oldest_first() {
        let (_dir, buffer) = open_temp().await;
        let t0 = Utc::now();
        buffer.enqueue("m-1", b"a", t0).await.unwrap();
        buffer
            .enqueue("m-2", b"b", t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();
        buffer
            .enqueue("m-3", b"c", t0 + chrono::Duration::seconds(2))
            .await
            .unwrap();

        let batch = buffer.dequeue_batch(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].message_id, "m-1");
        assert_eq!(batch[1].message_id, "m-2");
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let (_dir, buffer) = open_temp().await;
        buffer.enqueue("m-1", b"a", Utc::now()).await.unwrap();
        buffer.delete("m-1").await.unwrap();
        let metrics = buffer.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 0);
    }

    #[tokio::test]
    async fn quota_evicts_oldest_to_make_room() {
        let dir = tempfile::tempdir().unwrap();
        let path = LocalBuffer::path_for(dir.path());
        // Small quota: only one ~10 byte row fits at a time.
        let buffer = LocalBuffer::open(&path, 12).await.unwrap();
        let t0 = Utc::now();
        buffer.enqueue("m-1", b"0123456789", t0).await.unwrap();
        buffer
            .enqueue("m-2", b"0123456789", t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();

        let metrics = buffer.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 1);
        assert!(metrics.evictions_total >= 1);

        let remaining = buffer.dequeue_batch(10).await.unwrap();
        assert_eq!(remaining[0].message_id, "m-2");
    }

    #[tokio::test]
    async fn prune_drops_rows_past_max_age() {
        let (_dir, buffer) = open_temp().await;
        let old = Utc::now() - chrono::Duration::days(10);
        buffer.enqueue("m-old", b"a", old).await.unwrap();
        buffer.enqueue("m-new", b"b", Utc::now()).await.unwrap();

        let removed = buffer.prune(1000, 86_400).await.unwrap();
        assert_eq!(removed, 1);
        let metrics = buffer.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_quarantined_and_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let path = LocalBuffer::path_for(dir.path());
        std::fs::write(&path, b"not a sqlite file at all, definitely garbage bytes")
            .unwrap();

        let buffer = LocalBuffer::open(&path, 10_000_000).await.unwrap();
        buffer.enqueue("m-1", b"a", Utc::now()).await.unwrap();
        let metrics = buffer.metrics().await.unwrap();
        assert_eq!(metrics.queue_depth, 1);

        let quarantined = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains("corrupt-"));
        assert!(quarantined);
    }
}
