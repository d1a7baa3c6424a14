//! Worker pool and crawl controller (C11, §4.11).
//!
//! Mirrors the teacher's `JobProcessor`/`Crawler` split: the controller owns
//! the frontier, browser, robots/sitemap/politeness singletons and the
//! cancellation-token tree; each worker pulls from the frontier, fetches,
//! extracts, persists, runs analyzers, and enqueues newly discovered links.

use crate::browser::BrowserPool;
use crate::domain::models::{LinkType as DomainLinkType, NewQueueItem, NewUrl, Project, UrlStatus};
use crate::error::Result;
use crate::extractor::{link_extractor, page_extractor};
use crate::fetcher;
use crate::frontier::Frontier;
use crate::plugin::{PluginRegistry, UrlContext, UrlMetadata};
use crate::politeness::PolitenessGate;
use crate::repository::{LinkRepository, ReportRepository, UrlRepository};
use crate::robots::RobotsCache;
use crate::sitemap::SitemapDiscoverer;
use crate::url_filter;
use crate::worker::progress::{decorate_last_crawled_url, ProgressReporter, ProgressUpdate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url as ParsedUrl;

const EMPTY_STREAK_LIMIT: u32 = 5;
const EMPTY_POLL_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Stopping,
}

struct SharedWorkerState {
    frontier: Arc<Frontier>,
    browser: Arc<BrowserPool>,
    robots: Arc<RobotsCache>,
    politeness: Arc<PolitenessGate>,
    url_repo: Arc<UrlRepository>,
    link_repo: Arc<LinkRepository>,
    report_repo: Arc<ReportRepository>,
    plugins: Arc<PluginRegistry>,
    project: Arc<Project>,
    active_workers: Arc<AtomicUsize>,
    completed_count: Arc<AtomicI64>,
    failed_count: Arc<AtomicI64>,
    error_count: Arc<AtomicI64>,
    last_crawled_url: Arc<StdMutex<Option<String>>>,
}

pub struct Controller {
    state: std::sync::Mutex<ControllerState>,
    root_cancel: CancellationToken,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(ControllerState::Idle),
            root_cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap()
    }

    pub fn request_stop(&self) {
        *self.state.lock().unwrap() = ControllerState::Stopping;
        self.root_cancel.cancel();
    }

    /// Idempotent: seeds the frontier with the project's base URL (and its
    /// sitemap, if enabled) only when the frontier is empty, then runs
    /// `concurrent_requests` workers to completion.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        &self,
        project: Project,
        frontier: Frontier,
        browser: BrowserPool,
        robots: RobotsCache,
        url_repo: UrlRepository,
        link_repo: LinkRepository,
        report_repo: ReportRepository,
        plugins: PluginRegistry,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ControllerState::Running {
                return Ok(());
            }
            *state = ControllerState::Running;
        }

        let project = Arc::new(project);
        let frontier = Arc::new(frontier);
        let browser = Arc::new(browser);
        let robots = Arc::new(robots);
        let politeness = Arc::new(PolitenessGate::new());
        let url_repo = Arc::new(url_repo);
        let link_repo = Arc::new(link_repo);
        let report_repo = Arc::new(report_repo);
        let plugins = Arc::new(plugins);

        frontier.reclaim_stale(project.id).await?;
        self.seed_if_empty(&project, &frontier, &robots).await?;

        let shared = Arc::new(SharedWorkerState {
            frontier: frontier.clone(),
            browser: browser.clone(),
            robots: robots.clone(),
            politeness,
            url_repo,
            link_repo,
            report_repo,
            plugins,
            project: project.clone(),
            active_workers: Arc::new(AtomicUsize::new(0)),
            completed_count: Arc::new(AtomicI64::new(0)),
            failed_count: Arc::new(AtomicI64::new(0)),
            error_count: Arc::new(AtomicI64::new(0)),
            last_crawled_url: Arc::new(StdMutex::new(None)),
        });

        let worker_count = project.settings.concurrent_requests.max(1);
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for worker_id in 0..worker_count {
            let cancel = self.root_cancel.child_token();
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, shared, cancel).await;
            }));
        }

        let reporter = ProgressReporter::new();
        let reporter_cancel = self.root_cancel.child_token();
        let reporter_shared = shared.clone();
        let start_time = Instant::now();
        let reporter_handle = tokio::spawn(async move {
            reporter
                .run(reporter_cancel, move || sample_progress(&reporter_shared, start_time))
                .await;
        });

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
            }
        }

        // Workers are done; stop the reporter's tick loop so it emits its
        // final snapshot and returns (it shares the root cancellation, which
        // may not have fired yet if the pool simply drained on its own).
        self.root_cancel.cancel();
        if let Err(e) = reporter_handle.await {
            warn!(error = %e, "progress reporter task panicked");
        }

        browser.shutdown().await;

        *self.state.lock().unwrap() = ControllerState::Idle;
        Ok(())
    }

    async fn seed_if_empty(
        &self,
        project: &Project,
        frontier: &Frontier,
        robots: &RobotsCache,
    ) -> Result<()> {
        if !frontier.is_empty() {
            return Ok(());
        }

        let base_url = ParsedUrl::parse(&project.settings.base_url)
            .map_err(|e| crate::error::CrawlError::ParseError(e.to_string()))?;

        frontier
            .enqueue(&NewQueueItem {
                project_id: project.id,
                address: base_url.to_string(),
                normalized_key: url_filter::normalized_key(&base_url),
                host_key: url_filter::host_key(&base_url),
                priority: 1000,
                depth: 0,
            })
            .await?;

        if project.settings.use_sitemap_xml {
            let sitemaps = robots.sitemaps(&base_url).await;
            let discoverer = SitemapDiscoverer::new();
            let urls = discoverer.discover(&base_url, &sitemaps).await;
            info!(count = urls.len(), "seeding frontier from sitemap");
            for u in urls {
                if url_filter::normalize_and_filter(&u, &base_url).is_err() {
                    continue;
                }
                let _ = frontier
                    .enqueue(&NewQueueItem {
                        project_id: project.id,
                        address: u.to_string(),
                        normalized_key: url_filter::normalized_key(&u),
                        host_key: url_filter::host_key(&u),
                        priority: 900,
                        depth: 0,
                    })
                    .await;
            }
        }

        Ok(())
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

async fn worker_loop(worker_id: u32, shared: Arc<SharedWorkerState>, cancel: CancellationToken) {
    let mut empty_streak: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if shared.completed_count.load(Ordering::SeqCst) as u32 >= shared.project.settings.max_urls_to_crawl {
            info!(worker = worker_id, "worker exiting: crawl budget reached");
            break;
        }

        let item = match shared.frontier.get_next(shared.project.id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                empty_streak += 1;
                if empty_streak >= EMPTY_STREAK_LIMIT && shared.active_workers.load(Ordering::SeqCst) == 0 {
                    break;
                }
                tokio::time::sleep(EMPTY_POLL_BACKOFF).await;
                continue;
            }
            Err(e) => {
                warn!(worker = worker_id, error = %e, "frontier dequeue failed");
                tokio::time::sleep(EMPTY_POLL_BACKOFF).await;
                continue;
            }
        };

        empty_streak = 0;
        shared.active_workers.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = process_item(&shared, &item, &cancel).await {
            warn!(worker = worker_id, url = %item.address, error = %e, "failed to process queue item");
            let _ = shared.frontier.mark_failed(item.id).await;
            shared.failed_count.fetch_add(1, Ordering::SeqCst);
            shared.error_count.fetch_add(1, Ordering::SeqCst);
            *shared.last_crawled_url.lock().unwrap() = Some(decorate_last_crawled_url(&item.address, 0));
        } else {
            shared.completed_count.fetch_add(1, Ordering::SeqCst);
        }

        shared.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    info!(worker = worker_id, "worker exiting: frontier drained");
}

fn sample_progress(shared: &SharedWorkerState, start_time: Instant) -> ProgressUpdate {
    ProgressUpdate {
        urls_crawled: shared.completed_count.load(Ordering::SeqCst),
        total_discovered: shared.frontier.total_discovered(),
        queue_size: shared.frontier.queued_len(),
        active_workers: shared.active_workers.load(Ordering::SeqCst) as i64,
        error_count: shared.error_count.load(Ordering::SeqCst),
        elapsed: start_time.elapsed(),
        last_crawled_url: shared.last_crawled_url.lock().unwrap().clone(),
    }
}

async fn process_item(
    shared: &SharedWorkerState,
    item: &crate::domain::models::CrawlQueueItem,
    cancel: &CancellationToken,
) -> Result<()> {
    let target = ParsedUrl::parse(&item.address)
        .map_err(|e| crate::error::CrawlError::ParseError(e.to_string()))?;
    let settings = &shared.project.settings;
    let user_agent = settings.resolve_user_agent();

    if settings.respect_robots_txt && !shared.robots.allowed(&target, user_agent).await {
        let url_id = persist_skipped(shared, item, &target, UrlStatus::Failed, Some(false)).await?;
        let _ = url_id;
        shared.frontier.mark_completed(item.id).await?;
        return Ok(());
    }

    let wait = shared
        .politeness
        .wait_duration(&item.host_key, politeness_delay(shared, &target, user_agent, settings).await);
    if wait > Duration::ZERO {
        tokio::time::sleep(wait).await;
    }
    shared.politeness.record_request(&item.host_key);

    let timeout = Duration::from_secs(settings.timeout_seconds as u64);
    let outcome = fetcher::fetch(&shared.browser, target.as_str(), user_agent, timeout).await?;

    *shared.last_crawled_url.lock().unwrap() =
        Some(decorate_last_crawled_url(&outcome.final_url, outcome.status));
    if !outcome.is_success {
        shared.error_count.fetch_add(1, Ordering::SeqCst);
    }

    let html = outcome.html.clone();
    let lowered_headers: HashMap<String, String> = outcome
        .headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();

    let final_url = ParsedUrl::parse(&outcome.final_url).unwrap_or_else(|_| target.clone());
    let facts = html
        .as_deref()
        .map(|h| page_extractor::extract(h, &lowered_headers, &final_url))
        .unwrap_or_default();

    let new_url = NewUrl {
        project_id: shared.project.id,
        address: final_url.to_string(),
        normalized_key: url_filter::normalized_key(&final_url),
        scheme: final_url.scheme().to_string(),
        host: final_url.host_str().unwrap_or_default().to_string(),
        path: final_url.path().to_string(),
        depth: item.depth,
        status: if outcome.is_success { UrlStatus::Completed } else { UrlStatus::Failed },
        http_status: Some(outcome.status),
        content_type: lowered_headers.get("content-type").cloned(),
        content_length: None,
        robots_allowed: Some(true),
        discovered_from_url_id: None,
        facts,
    };

    let url_id = shared.url_repo.upsert(&new_url).await?;
    shared.url_repo.save_redirects(url_id, &outcome.redirect_chain).await?;

    if let Some(html) = &html {
        let hreflangs = page_extractor::extract_hreflangs(html, &lowered_headers, &final_url)
            .into_iter()
            .map(|mut h| {
                h.url_id = url_id;
                h
            })
            .collect::<Vec<_>>();
        shared.url_repo.save_hreflangs(url_id, &hreflangs).await?;

        let structured_data = page_extractor::extract_structured_data(html)
            .into_iter()
            .map(|mut sd| {
                sd.url_id = url_id;
                sd
            })
            .collect::<Vec<_>>();
        shared.url_repo.save_structured_data(url_id, &structured_data).await?;
    }

    // Link discovery only happens for successful HTML fetches within the
    // configured depth bound (§4.11 worker loop, invariant #4).
    if outcome.is_success && html.is_some() && item.depth < settings.max_crawl_depth {
        let html = html.as_deref().expect("checked above");
        let extracted_links = link_extractor::extract(html, &final_url);
        let mut persisted_links = Vec::new();
        for link in extracted_links {
            let filtered = url_filter::normalize_and_filter(
                &link.target,
                &ParsedUrl::parse(&shared.project.settings.base_url).unwrap_or_else(|_| final_url.clone()),
            );
            let Ok(normalized) = filtered else { continue };

            let target_url_id = shared
                .url_repo
                .upsert(&NewUrl {
                    project_id: shared.project.id,
                    address: normalized.to_string(),
                    normalized_key: url_filter::normalized_key(&normalized),
                    scheme: normalized.scheme().to_string(),
                    host: normalized.host_str().unwrap_or_default().to_string(),
                    path: normalized.path().to_string(),
                    depth: item.depth + 1,
                    status: UrlStatus::Pending,
                    http_status: None,
                    content_type: None,
                    content_length: None,
                    robots_allowed: None,
                    discovered_from_url_id: Some(url_id),
                    facts: Default::default(),
                })
                .await?;

            persisted_links.push(crate::domain::models::Link {
                project_id: shared.project.id,
                from_url_id: url_id,
                to_url_id: target_url_id,
                anchor_text: link.anchor_text,
                link_type: link.link_type,
                rel: link.rel,
                is_nofollow: link.is_nofollow,
                is_ugc: link.is_ugc,
                is_sponsored: link.is_sponsored,
            });

            if link.link_type == DomainLinkType::Hyperlink
                && (shared.frontier.queued_len() as u32) < shared.project.settings.max_urls_to_crawl
            {
                let _ = shared
                    .frontier
                    .enqueue(&NewQueueItem {
                        project_id: shared.project.id,
                        address: normalized.to_string(),
                        normalized_key: url_filter::normalized_key(&normalized),
                        host_key: url_filter::host_key(&normalized),
                        priority: 100,
                        depth: item.depth + 1,
                    })
                    .await;
            }
        }
        shared.link_repo.delete_from_source(url_id).await?;
        shared.link_repo.insert_batch(&persisted_links).await?;
    }

    let metadata = UrlMetadata {
        url: final_url.clone(),
        depth: item.depth,
        http_status: Some(outcome.status),
        headers: lowered_headers,
    };
    let ctx = UrlContext::new(
        shared.project.id,
        url_id,
        metadata,
        None,
        html.as_deref(),
        &new_url.facts,
        settings,
    );
    shared.plugins.run_all(&ctx, cancel).await;
    let (findings, report_rows, enqueued) = ctx.take_findings();
    shared.report_repo.insert_findings(&findings).await?;
    shared.report_repo.insert_report_rows(&report_rows).await?;
    for item in enqueued {
        let _ = shared.frontier.enqueue(&item).await;
    }

    shared.browser.close_page(outcome.page).await;
    shared.frontier.mark_completed(item.id).await?;
    Ok(())
}

async fn politeness_delay(
    shared: &SharedWorkerState,
    target: &ParsedUrl,
    user_agent: &str,
    settings: &crate::domain::models::ProjectSettings,
) -> Duration {
    if let Some(robots_delay) = shared.robots.crawl_delay(target, user_agent).await {
        Duration::from_secs_f64(robots_delay)
    } else {
        Duration::from_secs_f64(settings.crawl_delay_seconds)
    }
}

async fn persist_skipped(
    shared: &SharedWorkerState,
    item: &crate::domain::models::CrawlQueueItem,
    target: &ParsedUrl,
    status: UrlStatus,
    robots_allowed: Option<bool>,
) -> Result<i64> {
    shared
        .url_repo
        .upsert(&NewUrl {
            project_id: shared.project.id,
            address: target.to_string(),
            normalized_key: item.normalized_key.clone(),
            scheme: target.scheme().to_string(),
            host: target.host_str().unwrap_or_default().to_string(),
            path: target.path().to_string(),
            depth: item.depth,
            status,
            http_status: None,
            content_type: None,
            content_length: None,
            robots_allowed,
            discovered_from_url_id: None,
            facts: Default::default(),
        })
        .await
}
