//! Durable priority queue backing the Frontier (C4, §4.4): `crawl_queue`.

use super::map_queue_state;
use crate::domain::models::{CrawlQueueItem, NewQueueItem, QueueState};
use crate::error::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

pub struct FrontierRepository {
    pool: SqlitePool,
}

impl FrontierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent insert keyed by `(project_id, normalized_key)` among
    /// non-`Completed` rows (the partial unique index does the deduping).
    /// Returns `true` if a new row was inserted.
    pub async fn enqueue(&self, item: &NewQueueItem) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO crawl_queue
                (project_id, address, normalized_key, host_key, priority, depth, state, enqueued_at)
             VALUES (?, ?, ?, ?, ?, ?, 'Queued', ?)",
        )
        .bind(item.project_id)
        .bind(&item.address)
        .bind(&item.normalized_key)
        .bind(&item.host_key)
        .bind(item.priority)
        .bind(item.depth)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically claims the highest-priority queued item (ties broken by
    /// lowest id, i.e. insertion order) and transitions it to `InProgress`.
    pub async fn get_next(&self, project_id: i64) -> Result<Option<CrawlQueueItem>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, project_id, address, normalized_key, host_key, priority, depth, state, enqueued_at
             FROM crawl_queue
             WHERE project_id = ? AND state = 'Queued'
             ORDER BY priority DESC, id ASC
             LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let id: i64 = row.get("id");
        sqlx::query("UPDATE crawl_queue SET state = 'InProgress' WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let item = CrawlQueueItem {
            id,
            project_id: row.get("project_id"),
            address: row.get("address"),
            normalized_key: row.get("normalized_key"),
            host_key: row.get("host_key"),
            priority: row.get("priority"),
            depth: row.get("depth"),
            state: QueueState::InProgress,
            enqueued_at: row
                .get::<String, _>("enqueued_at")
                .parse()
                .unwrap_or_else(|_| Utc::now()),
        };

        tx.commit().await?;
        Ok(Some(item))
    }

    pub async fn update_state(&self, id: i64, state: QueueState) -> Result<()> {
        sqlx::query("UPDATE crawl_queue SET state = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_queued(&self, project_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM crawl_queue WHERE project_id = ? AND state = 'Queued'",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    /// Reverts any items left `InProgress` by a prior run back to `Queued`,
    /// so a resumed crawl doesn't strand them forever.
    pub async fn requeue_stale_in_progress(&self, project_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE crawl_queue SET state = 'Queued' WHERE project_id = ? AND state = 'InProgress'",
        )
        .bind(project_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[allow(dead_code)]
    fn state_from_row(raw: &str) -> QueueState {
        map_queue_state(raw)
    }
}
