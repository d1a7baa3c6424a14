//! End-to-end scenarios exercising the frontier, robots cache, and
//! extraction/persistence pipeline together, without requiring a live
//! headless browser (the fetch step itself is unit-tested in `fetcher.rs`).

use chrono::Utc;
use sitewalker::domain::models::{NewQueueItem, NewUrl, QueueState, UrlStatus};
use sitewalker::extractor::page_extractor;
use sitewalker::frontier::Frontier;
use sitewalker::repository::{FrontierRepository, UrlRepository};
use sitewalker::robots::RobotsCache;
use sitewalker::url_filter;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use url::Url;

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

#[tokio::test]
async fn seed_only_scenario_enqueues_base_url_once() {
    let pool = test_pool().await;
    let repo = FrontierRepository::new(pool);
    let frontier = Frontier::new(repo, 1).await.unwrap();

    let base = Url::parse("https://example.com/").unwrap();
    let item = NewQueueItem {
        project_id: 1,
        address: base.to_string(),
        normalized_key: url_filter::normalized_key(&base),
        host_key: url_filter::host_key(&base),
        priority: 10,
        depth: 0,
    };

    assert!(frontier.enqueue(&item).await.unwrap());
    assert!(!frontier.enqueue(&item).await.unwrap());
    assert_eq!(frontier.queued_len(), 1);

    let claimed = frontier.get_next(1).await.unwrap().unwrap();
    assert_eq!(claimed.state, QueueState::InProgress);
    assert!(frontier.get_next(1).await.unwrap().is_none());
}

#[tokio::test]
async fn robots_deny_scenario_blocks_private_path() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /private/\n")
        .create_async()
        .await;

    let robots = RobotsCache::new();
    let base = Url::parse(&server.url()).unwrap();
    let private_path = base.join("/private/x").unwrap();
    let public_path = base.join("/public/x").unwrap();

    assert!(!robots.allowed(&private_path, "TestBot").await);
    assert!(robots.allowed(&public_path, "TestBot").await);
}

#[tokio::test]
async fn canonical_conflict_persists_cross_domain_issue() {
    let pool = test_pool().await;
    let repo = UrlRepository::new(pool);

    let current = Url::parse("https://example.com/page").unwrap();
    let html = r#"<html><head>
        <link rel="canonical" href="https://other.com/page">
        <link rel="canonical" href="https://example.com/page-2">
    </head></html>"#;
    let facts = page_extractor::extract(html, &HashMap::new(), &current);
    assert!(facts.has_multiple_canonicals);
    assert!(facts.has_cross_domain_canonical);

    let new_url = NewUrl {
        project_id: 1,
        address: current.to_string(),
        normalized_key: url_filter::normalized_key(&current),
        scheme: "https".to_string(),
        host: "example.com".to_string(),
        path: "/page".to_string(),
        depth: 0,
        status: UrlStatus::Completed,
        http_status: Some(200),
        content_type: Some("text/html".to_string()),
        content_length: None,
        robots_allowed: Some(true),
        discovered_from_url_id: None,
        facts,
    };

    let id = repo.upsert(&new_url).await.unwrap();
    let fetched = repo.get_by_id(id).await.unwrap().unwrap();
    assert!(fetched.facts.has_cross_domain_canonical);
    assert!(!fetched.facts.canonical_issues.is_empty());
}

#[tokio::test]
async fn robots_meta_and_http_conflict_is_flagged_and_resolved_restrictively() {
    let current = Url::parse("https://example.com/page").unwrap();
    let html = r#"<html><head><meta name="robots" content="index, follow"></head></html>"#;
    let mut headers = HashMap::new();
    headers.insert("x-robots-tag".to_string(), "noindex".to_string());

    let facts = page_extractor::extract(html, &headers, &current);
    assert!(facts.has_robots_conflict);
    assert_eq!(facts.robots_noindex, Some(true));
}

#[tokio::test]
async fn sitemap_seeding_scenario_discovers_additional_urls() {
    let mut server = mockito::Server::new_async().await;
    let body = format!(
        r#"<urlset><url><loc>{}a</loc></url><url><loc>{}b</loc></url></urlset>"#,
        server.url(),
        server.url()
    );
    let _m = server
        .mock("GET", "/sitemap.xml")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let discoverer = sitewalker::sitemap::SitemapDiscoverer::new();
    let base = Url::parse(&server.url()).unwrap();
    let urls = discoverer.discover(&base, &[]).await;
    assert_eq!(urls.len(), 2);
}
