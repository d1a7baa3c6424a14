//! Findings and report rows emitted by the plugin runtime (C12, §4.12).

use super::map_severity;
use crate::domain::models::{Finding, ReportRow, Severity};
use crate::error::{CrawlError, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_findings(&self, findings: &[Finding]) -> Result<()> {
        for f in findings {
            sqlx::query(
                "INSERT INTO findings (project_id, url_id, task_key, severity, code, message, details, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(f.project_id)
            .bind(f.url_id)
            .bind(&f.task_key)
            .bind(f.severity.as_str())
            .bind(&f.code)
            .bind(&f.message)
            .bind(&f.details)
            .bind(f.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn insert_report_rows(&self, rows: &[ReportRow]) -> Result<()> {
        for r in rows {
            let data = serde_json::to_string(&r.data_map)
                .map_err(|e| CrawlError::PersistenceError(e.to_string()))?;
            sqlx::query(
                "INSERT INTO report_rows (project_id, task_key, url_id, data_map, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(r.project_id)
            .bind(&r.task_key)
            .bind(r.url_id)
            .bind(data)
            .bind(r.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn count_findings_by_severity(&self, project_id: i64, severity: Severity) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM findings WHERE project_id = ? AND severity = ?")
            .bind(project_id)
            .bind(severity.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    #[allow(dead_code)]
    fn severity_roundtrip(raw: &str) -> Severity {
        map_severity(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool_with_url() -> (SqlitePool, i64) {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        sqlx::query("INSERT INTO projects (name, settings_blob, created_at) VALUES ('t', '{}', ?)")
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await
            .unwrap();
        let row = sqlx::query(
            "INSERT INTO urls (project_id, address, normalized_key, scheme, host, path, depth, first_seen_at, status)
             VALUES (1, 'https://example.com/', 'https://example.com/', 'https', 'example.com', '/', 0, ?, 'Pending') RETURNING id",
        )
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&pool)
        .await
        .unwrap();
        (pool, row.get("id"))
    }

    #[tokio::test]
    async fn insert_and_count_findings_by_severity() {
        let (pool, url_id) = test_pool_with_url().await;
        let repo = ReportRepository::new(pool);

        let finding = Finding {
            project_id: 1,
            url_id,
            task_key: "missing-title".to_string(),
            severity: Severity::Warning,
            code: "MISSING_TITLE".to_string(),
            message: "page has no <title>".to_string(),
            details: None,
            created_at: Utc::now(),
        };
        repo.insert_findings(&[finding]).await.unwrap();

        assert_eq!(repo.count_findings_by_severity(1, Severity::Warning).await.unwrap(), 1);
        assert_eq!(repo.count_findings_by_severity(1, Severity::Error).await.unwrap(), 0);
    }
}
