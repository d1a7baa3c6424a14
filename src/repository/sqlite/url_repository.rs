//! Persistence for `urls` and its child fact tables: headers, redirects,
//! hreflangs, structured data (C10, §4.10).

use super::{map_hreflang_source, map_robots_source, map_url_status};
use crate::domain::models::{
    Header, Hreflang, NewUrl, PageFacts, RedirectHop, StructuredData, Url, UrlStatus,
};
use crate::error::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

pub struct UrlRepository {
    pool: SqlitePool,
}

fn row_to_url(row: &sqlx::sqlite::SqliteRow) -> Url {
    Url {
        id: row.get("id"),
        project_id: row.get("project_id"),
        address: row.get("address"),
        normalized_key: row.get("normalized_key"),
        scheme: row.get("scheme"),
        host: row.get("host"),
        path: row.get("path"),
        depth: row.get("depth"),
        first_seen_at: row
            .get::<String, _>("first_seen_at")
            .parse()
            .unwrap_or_else(|_| Utc::now()),
        last_crawled_at: row
            .get::<Option<String>, _>("last_crawled_at")
            .and_then(|s| s.parse().ok()),
        status: map_url_status(&row.get::<String, _>("status")),
        http_status: row.get("http_status"),
        content_type: row.get("content_type"),
        content_length: row.get("content_length"),
        robots_allowed: row.get::<Option<i64>, _>("robots_allowed").map(|v| v != 0),
        discovered_from_url_id: row.get("discovered_from_url_id"),
        facts: PageFacts {
            title: row.get("title"),
            meta_description: row.get("meta_description"),
            canonical_html: row.get("canonical_html"),
            canonical_http: row.get("canonical_http"),
            has_multiple_canonicals: row.get::<i64, _>("has_multiple_canonicals") != 0,
            has_cross_domain_canonical: row.get::<i64, _>("has_cross_domain_canonical") != 0,
            canonical_issues: row
                .get::<Option<String>, _>("canonical_issues")
                .map(|s| serde_json::from_str(&s).unwrap_or_default())
                .unwrap_or_default(),
            robots_noindex: row.get::<Option<i64>, _>("robots_noindex").map(|v| v != 0),
            robots_nofollow: row.get::<Option<i64>, _>("robots_nofollow").map(|v| v != 0),
            robots_noarchive: row.get::<Option<i64>, _>("robots_noarchive").map(|v| v != 0),
            robots_nosnippet: row.get::<Option<i64>, _>("robots_nosnippet").map(|v| v != 0),
            robots_noimageindex: row.get::<Option<i64>, _>("robots_noimageindex").map(|v| v != 0),
            robots_source: map_robots_source(&row.get::<String, _>("robots_source")),
            x_robots_tag: row.get("x_robots_tag"),
            has_robots_conflict: row.get::<i64, _>("has_robots_conflict") != 0,
            html_lang: row.get("html_lang"),
            content_language_header: row.get("content_language_header"),
            has_meta_refresh: row.get::<i64, _>("has_meta_refresh") != 0,
            meta_refresh_delay: row.get("meta_refresh_delay"),
            meta_refresh_target: row.get("meta_refresh_target"),
            cache_control: row.get("cache_control"),
            vary: row.get("vary"),
            content_encoding: row.get("content_encoding"),
            link_header: row.get("link_header"),
            has_hsts: row.get::<i64, _>("has_hsts") != 0,
            redirect_target: row.get("redirect_target"),
        },
    }
}

impl UrlRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed by `(project_id, normalized_key)`. Inserts a
    /// fresh `Pending` row the first time a URL is discovered (from link
    /// extraction); overwrites facts in place once it's actually crawled.
    pub async fn upsert(&self, new_url: &NewUrl) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let f = &new_url.facts;
        let canonical_issues = serde_json::to_string(&f.canonical_issues).unwrap_or_default();

        let row = sqlx::query(
            "INSERT INTO urls (
                project_id, address, normalized_key, scheme, host, path, depth,
                first_seen_at, last_crawled_at, status, http_status, content_type,
                content_length, robots_allowed, discovered_from_url_id,
                title, meta_description, canonical_html, canonical_http,
                has_multiple_canonicals, has_cross_domain_canonical, canonical_issues,
                robots_noindex, robots_nofollow, robots_noarchive, robots_nosnippet,
                robots_noimageindex, robots_source, x_robots_tag, has_robots_conflict,
                html_lang, content_language_header, has_meta_refresh, meta_refresh_delay,
                meta_refresh_target, cache_control, vary, content_encoding, link_header,
                has_hsts, redirect_target
            ) VALUES (?,?,?,?,?,?,?, ?,?,?,?,?, ?,?,?, ?,?,?,?, ?,?,?, ?,?,?,?, ?,?,?,?, ?,?,?,?, ?,?,?,?,?, ?,?)
            ON CONFLICT(project_id, normalized_key) DO UPDATE SET
                address = excluded.address,
                last_crawled_at = excluded.last_crawled_at,
                status = excluded.status,
                http_status = excluded.http_status,
                content_type = excluded.content_type,
                content_length = excluded.content_length,
                robots_allowed = excluded.robots_allowed,
                title = excluded.title,
                meta_description = excluded.meta_description,
                canonical_html = excluded.canonical_html,
                canonical_http = excluded.canonical_http,
                has_multiple_canonicals = excluded.has_multiple_canonicals,
                has_cross_domain_canonical = excluded.has_cross_domain_canonical,
                canonical_issues = excluded.canonical_issues,
                robots_noindex = excluded.robots_noindex,
                robots_nofollow = excluded.robots_nofollow,
                robots_noarchive = excluded.robots_noarchive,
                robots_nosnippet = excluded.robots_nosnippet,
                robots_noimageindex = excluded.robots_noimageindex,
                robots_source = excluded.robots_source,
                x_robots_tag = excluded.x_robots_tag,
                has_robots_conflict = excluded.has_robots_conflict,
                html_lang = excluded.html_lang,
                content_language_header = excluded.content_language_header,
                has_meta_refresh = excluded.has_meta_refresh,
                meta_refresh_delay = excluded.meta_refresh_delay,
                meta_refresh_target = excluded.meta_refresh_target,
                cache_control = excluded.cache_control,
                vary = excluded.vary,
                content_encoding = excluded.content_encoding,
                link_header = excluded.link_header,
                has_hsts = excluded.has_hsts,
                redirect_target = excluded.redirect_target
            RETURNING id",
        )
        .bind(new_url.project_id)
        .bind(&new_url.address)
        .bind(&new_url.normalized_key)
        .bind(&new_url.scheme)
        .bind(&new_url.host)
        .bind(&new_url.path)
        .bind(new_url.depth)
        .bind(&now)
        .bind(if new_url.status == UrlStatus::Pending { None } else { Some(now.clone()) })
        .bind(new_url.status.as_str())
        .bind(new_url.http_status)
        .bind(&new_url.content_type)
        .bind(new_url.content_length)
        .bind(new_url.robots_allowed.map(|b| b as i64))
        .bind(new_url.discovered_from_url_id)
        .bind(&f.title)
        .bind(&f.meta_description)
        .bind(&f.canonical_html)
        .bind(&f.canonical_http)
        .bind(f.has_multiple_canonicals as i64)
        .bind(f.has_cross_domain_canonical as i64)
        .bind(canonical_issues)
        .bind(f.robots_noindex.map(|b| b as i64))
        .bind(f.robots_nofollow.map(|b| b as i64))
        .bind(f.robots_noarchive.map(|b| b as i64))
        .bind(f.robots_nosnippet.map(|b| b as i64))
        .bind(f.robots_noimageindex.map(|b| b as i64))
        .bind(f.robots_source.as_str())
        .bind(&f.x_robots_tag)
        .bind(f.has_robots_conflict as i64)
        .bind(&f.html_lang)
        .bind(&f.content_language_header)
        .bind(f.has_meta_refresh as i64)
        .bind(f.meta_refresh_delay)
        .bind(&f.meta_refresh_target)
        .bind(&f.cache_control)
        .bind(&f.vary)
        .bind(&f.content_encoding)
        .bind(&f.link_header)
        .bind(f.has_hsts as i64)
        .bind(&f.redirect_target)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    pub async fn get_by_normalized_key(&self, project_id: i64, key: &str) -> Result<Option<Url>> {
        let row = sqlx::query("SELECT * FROM urls WHERE project_id = ? AND normalized_key = ?")
            .bind(project_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_url(&r)))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Url>> {
        let row = sqlx::query("SELECT * FROM urls WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_url(&r)))
    }

    /// Appends a fresh header snapshot; history accumulates across recrawls.
    pub async fn save_headers(&self, url_id: i64, headers: &[Header]) -> Result<()> {
        for h in headers {
            sqlx::query("INSERT INTO headers (url_id, name, value) VALUES (?, ?, ?)")
                .bind(url_id)
                .bind(&h.name)
                .bind(&h.value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Replaces the stored redirect chain with the latest fetch's chain.
    pub async fn save_redirects(&self, url_id: i64, hops: &[RedirectHop]) -> Result<()> {
        sqlx::query("DELETE FROM redirects WHERE url_id = ?")
            .bind(url_id)
            .execute(&self.pool)
            .await?;
        for hop in hops {
            sqlx::query(
                "INSERT INTO redirects (url_id, from_url, to_url, status_code, position) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(url_id)
            .bind(&hop.from_url)
            .bind(&hop.to_url)
            .bind(hop.status_code)
            .bind(hop.position)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn save_hreflangs(&self, url_id: i64, entries: &[Hreflang]) -> Result<()> {
        sqlx::query("DELETE FROM hreflangs WHERE url_id = ?")
            .bind(url_id)
            .execute(&self.pool)
            .await?;
        for h in entries {
            sqlx::query(
                "INSERT INTO hreflangs (url_id, language_code, target_url, source, is_x_default) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(url_id)
            .bind(&h.language_code)
            .bind(&h.target_url)
            .bind(h.source.as_str())
            .bind(h.is_x_default as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn save_structured_data(&self, url_id: i64, entries: &[StructuredData]) -> Result<()> {
        sqlx::query("DELETE FROM structured_data WHERE url_id = ?")
            .bind(url_id)
            .execute(&self.pool)
            .await?;
        for sd in entries {
            sqlx::query(
                "INSERT INTO structured_data (url_id, schema_type, raw, is_valid, validation_errors) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(url_id)
            .bind(&sd.schema_type)
            .bind(&sd.raw)
            .bind(sd.is_valid as i64)
            .bind(&sd.validation_errors)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    #[allow(dead_code)]
    fn hreflang_source_roundtrip(raw: &str) -> crate::domain::models::HreflangSource {
        map_hreflang_source(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        sqlx::query("INSERT INTO projects (name, settings_blob, created_at) VALUES ('t', '{}', ?)")
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    fn pending_url(project_id: i64, address: &str) -> NewUrl {
        NewUrl {
            project_id,
            address: address.to_string(),
            normalized_key: address.to_lowercase(),
            scheme: "https".to_string(),
            host: "example.com".to_string(),
            path: "/".to_string(),
            depth: 0,
            status: UrlStatus::Pending,
            http_status: None,
            content_type: None,
            content_length: None,
            robots_allowed: None,
            discovered_from_url_id: None,
            facts: PageFacts::default(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_returns_same_id() {
        let pool = test_pool().await;
        let repo = UrlRepository::new(pool);

        let id1 = repo.upsert(&pending_url(1, "https://example.com/a")).await.unwrap();
        let id2 = repo.upsert(&pending_url(1, "https://example.com/a")).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn upsert_overwrites_facts_in_place() {
        let pool = test_pool().await;
        let repo = UrlRepository::new(pool);

        let mut new_url = pending_url(1, "https://example.com/a");
        repo.upsert(&new_url).await.unwrap();

        new_url.status = UrlStatus::Completed;
        new_url.http_status = Some(200);
        new_url.facts.title = Some("Hello".to_string());
        let id = repo.upsert(&new_url).await.unwrap();

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, UrlStatus::Completed);
        assert_eq!(fetched.http_status, Some(200));
        assert_eq!(fetched.facts.title, Some("Hello".to_string()));
    }

    #[tokio::test]
    async fn redirects_are_replaced_not_accumulated() {
        let pool = test_pool().await;
        let repo = UrlRepository::new(pool);
        let id = repo.upsert(&pending_url(1, "https://example.com/a")).await.unwrap();

        let hop = RedirectHop {
            url_id: id,
            from_url: "https://example.com/old".to_string(),
            to_url: "https://example.com/a".to_string(),
            status_code: 301,
            position: 0,
        };
        repo.save_redirects(id, &[hop.clone()]).await.unwrap();
        repo.save_redirects(id, &[hop]).await.unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM redirects WHERE url_id = ?")
            .bind(id)
            .fetch_one(&repo.pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(count, 1);
    }
}
