//! Outbound link persistence (C10, §4.10): batch inserts via `QueryBuilder`,
//! matching the teacher's chunked `push_values` idiom.

use super::map_link_type;
use crate::domain::models::Link;
use crate::error::Result;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

const BATCH_CHUNK_SIZE: usize = 100;

pub struct LinkRepository {
    pool: SqlitePool,
}

impl LinkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a page's outbound links in chunks. Link rows are not unique
    /// per se (a page can link to the same target twice with different
    /// anchor text), so this is append-only per crawl of the source page;
    /// callers that recrawl a page should `delete_from_source` first.
    pub async fn insert_batch(&self, links: &[Link]) -> Result<()> {
        for chunk in links.chunks(BATCH_CHUNK_SIZE) {
            if chunk.is_empty() {
                continue;
            }
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO links (project_id, from_url_id, to_url_id, anchor_text, link_type, rel, is_nofollow, is_ugc, is_sponsored) ",
            );
            builder.push_values(chunk, |mut b, link| {
                b.push_bind(link.project_id)
                    .push_bind(link.from_url_id)
                    .push_bind(link.to_url_id)
                    .push_bind(link.anchor_text.clone())
                    .push_bind(link.link_type.as_str())
                    .push_bind(link.rel.clone())
                    .push_bind(link.is_nofollow as i64)
                    .push_bind(link.is_ugc as i64)
                    .push_bind(link.is_sponsored as i64);
            });
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn delete_from_source(&self, from_url_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM links WHERE from_url_id = ?")
            .bind(from_url_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_for_project(&self, project_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM links WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// All links recorded as originating from `from_url_id`, typed back from
    /// their stored `link_type` string.
    pub async fn get_outgoing(&self, from_url_id: i64) -> Result<Vec<Link>> {
        let rows = sqlx::query(
            "SELECT project_id, from_url_id, to_url_id, anchor_text, link_type, rel, is_nofollow, is_ugc, is_sponsored
             FROM links WHERE from_url_id = ?",
        )
        .bind(from_url_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Link {
                project_id: row.get("project_id"),
                from_url_id: row.get("from_url_id"),
                to_url_id: row.get("to_url_id"),
                anchor_text: row.get("anchor_text"),
                link_type: map_link_type(&row.get::<String, _>("link_type")),
                rel: row.get("rel"),
                is_nofollow: row.get::<i64, _>("is_nofollow") != 0,
                is_ugc: row.get::<i64, _>("is_ugc") != 0,
                is_sponsored: row.get::<i64, _>("is_sponsored") != 0,
            })
            .collect())
    }
}
