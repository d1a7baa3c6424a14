//! `projects` persistence: settings are stored as a JSON blob (§3 note on
//! persistence representation) so `ProjectSettings` can evolve without a
//! migration per field.

use crate::domain::models::{Project, ProjectSettings};
use crate::error::{CrawlError, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

pub struct ProjectRepository {
    pool: SqlitePool,
}

impl ProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, settings: &ProjectSettings) -> Result<i64> {
        let blob = serde_json::to_string(settings)
            .map_err(|e| CrawlError::PersistenceError(e.to_string()))?;
        let row = sqlx::query(
            "INSERT INTO projects (name, settings_blob, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(blob)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    pub async fn get(&self, id: i64) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, settings_blob, created_at FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let settings: ProjectSettings = serde_json::from_str(&r.get::<String, _>("settings_blob"))
                .map_err(|e| CrawlError::PersistenceError(e.to_string()))?;
            Ok(Project {
                id: r.get("id"),
                name: r.get("name"),
                settings,
                created_at: r
                    .get::<String, _>("created_at")
                    .parse()
                    .unwrap_or_else(|_| Utc::now()),
            })
        })
        .transpose()
    }

    /// Finds an existing project for `base_url`, if any, so a re-run of the
    /// same crawl can resume its frontier instead of starting a new project.
    pub async fn find_by_base_url(&self, base_url: &str) -> Result<Option<Project>> {
        let rows = sqlx::query("SELECT id, name, settings_blob, created_at FROM projects")
            .fetch_all(&self.pool)
            .await?;

        for r in rows {
            let settings: ProjectSettings = match serde_json::from_str(&r.get::<String, _>("settings_blob")) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if settings.base_url == base_url {
                return Ok(Some(Project {
                    id: r.get("id"),
                    name: r.get("name"),
                    settings,
                    created_at: r
                        .get::<String, _>("created_at")
                        .parse()
                        .unwrap_or_else(|_| Utc::now()),
                }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn create_and_get_roundtrips_settings() {
        let pool = test_pool().await;
        let repo = ProjectRepository::new(pool);

        let mut settings = ProjectSettings::default();
        settings.base_url = "https://example.com".to_string();

        let id = repo.create("example crawl", &settings).await.unwrap();
        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.settings.base_url, "https://example.com");
        assert_eq!(fetched.settings.max_urls_to_crawl, 500);
    }

    #[tokio::test]
    async fn find_by_base_url_locates_existing_project() {
        let pool = test_pool().await;
        let repo = ProjectRepository::new(pool);

        let mut settings = ProjectSettings::default();
        settings.base_url = "https://example.com".to_string();
        let id = repo.create("example crawl", &settings).await.unwrap();

        let found = repo.find_by_base_url("https://example.com").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(repo.find_by_base_url("https://other.com").await.unwrap().is_none());
    }
}
