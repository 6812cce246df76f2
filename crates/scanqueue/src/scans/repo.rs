// crates/scanqueue/src/scans/repo.rs

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::scans::error::QueueError;
use crate::scans::model::{QueuedScan, ScanRow, ScanStatus, StatusCounts};

const SELECT_COLUMNS: &str = r#"
    SELECT id, image_data, content_type, timestamp_ms, status,
           retries, last_error, updated_at_ms
    FROM scan_queue
"#;

/// Thin data-access layer over the `scan_queue` table. Callers that need
/// serialized writes go through `OfflineScanQueue`.
#[derive(Clone)]
pub struct ScanRepo {
    pool: SqlitePool,
}

impl ScanRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ----------------------------
    // Inserts
    // ----------------------------

    pub async fn insert(&self, scan: &QueuedScan) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            INSERT INTO scan_queue (
                id, image_data, content_type, timestamp_ms, status,
                retries, last_error, updated_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&scan.id)
        .bind(&scan.image.bytes)
        .bind(&scan.image.content_type)
        .bind(scan.timestamp.timestamp_millis())
        .bind(scan.status.as_str())
        .bind(scan.retries)
        .bind(&scan.last_error)
        .bind(scan.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get(&self, id: &str) -> Result<Option<QueuedScan>, QueueError> {
        let row = sqlx::query_as::<_, ScanRow>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueuedScan::try_from).transpose()
    }

    /// Oldest capture first; rowid breaks ties so same-millisecond scans keep
    /// insertion order.
    pub async fn list_by_status(&self, status: ScanStatus) -> Result<Vec<QueuedScan>, QueueError> {
        let rows = sqlx::query_as::<_, ScanRow>(&format!(
            "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY timestamp_ms ASC, rowid ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueuedScan::try_from).collect()
    }

    /// Newest first, for inspection views.
    /// - status is an optional filter
    /// - limit is clamped to [1, 500]
    pub async fn list(
        &self,
        status: Option<ScanStatus>,
        limit: i64,
    ) -> Result<Vec<QueuedScan>, QueueError> {
        let limit = limit.clamp(1, 500);

        let rows = match status {
            Some(st) => {
                sqlx::query_as::<_, ScanRow>(&format!(
                    "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY timestamp_ms DESC, rowid DESC LIMIT ?2"
                ))
                .bind(st.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ScanRow>(&format!(
                    "{SELECT_COLUMNS} ORDER BY timestamp_ms DESC, rowid DESC LIMIT ?1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(QueuedScan::try_from).collect()
    }

    pub async fn count(&self) -> Result<i64, QueueError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM scan_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            counts.add(status.parse()?, n);
        }
        Ok(counts)
    }

    // ----------------------------
    // State transitions
    // ----------------------------

    pub async fn set_status(&self, id: &str, status: ScanStatus) -> Result<(), QueueError> {
        let res = sqlx::query(
            r#"
            UPDATE scan_queue
            SET status = ?2,
                updated_at_ms = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// pending -> syncing, bumping the attempt counter. Returns the new count,
    /// or `None` when the scan is gone or no longer pending.
    pub async fn begin_attempt(&self, id: &str) -> Result<Option<i32>, QueueError> {
        let retries: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE scan_queue
            SET status = 'syncing',
                retries = retries + 1,
                updated_at_ms = ?2
            WHERE id = ?1
              AND status = 'pending'
            RETURNING retries
            "#,
        )
        .bind(id)
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(retries)
    }

    pub async fn mark_synced(&self, id: &str) -> Result<(), QueueError> {
        let res = sqlx::query(
            r#"
            UPDATE scan_queue
            SET status = 'synced',
                last_error = NULL,
                updated_at_ms = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// syncing -> pending for an attempt whose outcome could not be stored.
    /// Returns false when the scan is gone or was moved on by someone else.
    pub async fn release_attempt(&self, id: &str) -> Result<bool, QueueError> {
        let res = sqlx::query(
            r#"
            UPDATE scan_queue
            SET status = 'pending',
                updated_at_ms = ?2
            WHERE id = ?1
              AND status = 'syncing'
            "#,
        )
        .bind(id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    /// Records a failed attempt; `status` is `failed` or, when the retry
    /// policy allows another go, `pending`.
    pub async fn record_failure(
        &self,
        id: &str,
        status: ScanStatus,
        reason: &str,
    ) -> Result<(), QueueError> {
        let res = sqlx::query(
            r#"
            UPDATE scan_queue
            SET status = ?2,
                last_error = ?3,
                updated_at_ms = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(reason)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Bulk move of every row in `from` to `to`. Returns the ids touched.
    pub async fn move_all(
        &self,
        from: ScanStatus,
        to: ScanStatus,
    ) -> Result<Vec<String>, QueueError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE scan_queue
            SET status = ?2,
                updated_at_ms = ?3
            WHERE status = ?1
            RETURNING id
            "#,
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(Utc::now().timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    // ----------------------------
    // Deletes
    // ----------------------------

    pub async fn delete(&self, id: &str) -> Result<(), QueueError> {
        let res = sqlx::query("DELETE FROM scan_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Drops synced scans captured before `cutoff`. Other statuses are never touched.
    pub async fn purge_synced_before(&self, cutoff: DateTime<Utc>) -> Result<u64, QueueError> {
        let res = sqlx::query(
            r#"
            DELETE FROM scan_queue
            WHERE status = 'synced'
              AND timestamp_ms < ?1
            "#,
        )
        .bind(cutoff.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }
}
