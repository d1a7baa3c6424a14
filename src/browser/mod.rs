//! Shared headless-browser process (C6, §4.6).
//!
//! Unlike a pre-warmed multi-browser pool, this crawler needs exactly one
//! browser per run: pages are cheap to open/close, and a project's proxy
//! (if any) is a launch-time Chrome flag, so a single `Browser` instance is
//! launched lazily on first use and torn down once via a two-phase shutdown.

use crate::domain::models::ProxyConfig;
use crate::error::{CrawlError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;
const NAVIGATION_TIMEOUT_SECS: u64 = 30;

struct LaunchedBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// Lazily launches and owns a single headless Chrome process for the run.
pub struct BrowserPool {
    inner: Mutex<Option<LaunchedBrowser>>,
    headless: bool,
    proxy: Option<ProxyConfig>,
}

impl BrowserPool {
    pub fn new(headless: bool, proxy: Option<ProxyConfig>) -> Self {
        Self {
            inner: Mutex::new(None),
            headless,
            proxy,
        }
    }

    async fn ensure_launched(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut builder = BrowserConfig::builder()
            .request_timeout(std::time::Duration::from_secs(NAVIGATION_TIMEOUT_SECS))
            .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT);

        if !self.headless {
            builder = builder.with_head();
        }

        if let Some(proxy) = &self.proxy {
            if proxy.enabled {
                builder = builder.arg(format!("--proxy-server={}", proxy.server));
            }
        }

        let config = builder
            .build()
            .map_err(|e| CrawlError::NavigationFailed(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CrawlError::NavigationFailed(format!("browser launch: {e}")))?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let msg = e.to_string();
                    // CDP emits a few benign deserialization errors for event
                    // types we don't care about; don't spam logs with those.
                    if msg.contains("unknown variant") || msg.contains("missing field") {
                        debug!(error = %msg, "ignoring benign CDP event decode error");
                        continue;
                    }
                    error!(error = %msg, "chrome devtools protocol handler error");
                }
            }
        });

        *guard = Some(LaunchedBrowser { browser, handler_task });
        Ok(())
    }

    /// Opens a fresh page for a single fetch. The caller is responsible for
    /// calling `close_page` once done (see `fetcher::fetch`).
    pub async fn create_page(&self, user_agent: &str) -> Result<Page> {
        self.ensure_launched().await?;
        let guard = self.inner.lock().await;
        let launched = guard.as_ref().expect("browser launched by ensure_launched");

        let page = launched
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| CrawlError::NavigationFailed(format!("new page: {e}")))?;

        page.set_user_agent(user_agent)
            .await
            .map_err(|e| CrawlError::NavigationFailed(format!("set user agent: {e}")))?;

        Ok(page)
    }

    pub async fn close_page(&self, page: Page) {
        if let Err(e) = page.close().await {
            warn!(error = %e, "failed to close page cleanly");
        }
    }

    /// Two-phase shutdown: the caller must ensure in-flight pages are closed
    /// before calling this (the worker pool does so by draining its workers
    /// first). This only disposes the browser process itself.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut launched) = guard.take() {
            if let Err(e) = launched.browser.close().await {
                warn!(error = %e, "error closing browser process");
            }
            let _ = launched.browser.wait().await;
            launched.handler_task.abort();
        }
    }
}

pub type SharedBrowserPool = Arc<BrowserPool>;
