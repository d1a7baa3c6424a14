//! Analyzer plugin runtime (C12, §4.12). Ships with zero built-in analyzers;
//! business-rule SEO checks are plugins registered by the caller, each
//! producing findings and/or report rows for a single URL.

use crate::domain::models::{Finding, NewQueueItem, PageFacts, ProjectSettings, ReportRow, Severity};
use async_trait::async_trait;
use chromiumoxide::page::Page;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use url::Url;

/// Metadata about the URL currently being analyzed, alongside the fetched
/// artifacts an analyzer might need.
pub struct UrlMetadata {
    pub url: Url,
    pub depth: i32,
    pub http_status: Option<i32>,
    pub headers: HashMap<String, String>,
}

/// Everything an `Analyzer::execute` call needs: the page (if the browser
/// session is still open), parsed facts, settings, and sinks for results.
pub struct UrlContext<'a> {
    pub metadata: UrlMetadata,
    pub page: Option<&'a Page>,
    pub html: Option<&'a str>,
    pub facts: &'a PageFacts,
    pub settings: &'a ProjectSettings,
    findings: Mutex<Vec<Finding>>,
    report_rows: Mutex<Vec<ReportRow>>,
    enqueued: Mutex<Vec<NewQueueItem>>,
    project_id: i64,
    url_id: i64,
}

impl<'a> UrlContext<'a> {
    pub fn new(
        project_id: i64,
        url_id: i64,
        metadata: UrlMetadata,
        page: Option<&'a Page>,
        html: Option<&'a str>,
        facts: &'a PageFacts,
        settings: &'a ProjectSettings,
    ) -> Self {
        Self {
            metadata,
            page,
            html,
            facts,
            settings,
            findings: Mutex::new(Vec::new()),
            report_rows: Mutex::new(Vec::new()),
            enqueued: Mutex::new(Vec::new()),
            project_id,
            url_id,
        }
    }

    pub fn emit_finding(&self, task_key: &str, severity: Severity, code: &str, message: &str, details: Option<String>) {
        self.findings.lock().unwrap().push(Finding {
            project_id: self.project_id,
            url_id: self.url_id,
            task_key: task_key.to_string(),
            severity,
            code: code.to_string(),
            message: message.to_string(),
            details,
            created_at: chrono::Utc::now(),
        });
    }

    pub fn emit_report_row(&self, task_key: &str, data: serde_json::Value) {
        self.report_rows.lock().unwrap().push(ReportRow {
            project_id: self.project_id,
            task_key: task_key.to_string(),
            url_id: Some(self.url_id),
            data_map: data,
            created_at: chrono::Utc::now(),
        });
    }

    /// Lets an analyzer seed additional crawl targets (e.g. from sitemap
    /// links it discovers inline). Enqueued via the normal frontier path
    /// after the batch of analyzers for this URL finishes.
    pub fn enqueue(&self, item: NewQueueItem) {
        self.enqueued.lock().unwrap().push(item);
    }

    pub fn take_findings(self) -> (Vec<Finding>, Vec<ReportRow>, Vec<NewQueueItem>) {
        (
            self.findings.into_inner().unwrap(),
            self.report_rows.into_inner().unwrap(),
            self.enqueued.into_inner().unwrap(),
        )
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Stable identifier used as `task_key` on findings/report rows.
    fn key(&self) -> &str;
    fn display_name(&self) -> &str;
    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }
    async fn execute(&self, ctx: &UrlContext<'_>, cancel: &CancellationToken);
}

/// Priority-ordered analyzer registry. Empty by default: the crawler ships
/// no built-in SEO rules, only the extraction pipeline that feeds analyzers.
#[derive(Default)]
pub struct PluginRegistry {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, analyzer: Box<dyn Analyzer>) {
        self.analyzers.push(analyzer);
        self.analyzers.sort_by_key(|a| std::cmp::Reverse(a.priority()));
    }

    /// Runs every registered analyzer against `ctx` in priority order. A
    /// single analyzer panicking or erroring does not stop the others; it's
    /// logged and skipped. Cancellation stops the remaining analyzers early.
    pub async fn run_all(&self, ctx: &UrlContext<'_>, cancel: &CancellationToken) {
        for analyzer in &self.analyzers {
            if cancel.is_cancelled() {
                warn!("analyzer run cancelled before all plugins executed");
                break;
            }
            let key = analyzer.key();
            let result = std::panic::AssertUnwindSafe(analyzer.execute(ctx, cancel))
                .catch_unwind()
                .await;
            if result.is_err() {
                error!(analyzer = key, "analyzer panicked, isolating and continuing");
            }
        }
    }
}

use futures::FutureExt;

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFlags;

    #[async_trait]
    impl Analyzer for AlwaysFlags {
        fn key(&self) -> &str {
            "always-flags"
        }
        fn display_name(&self) -> &str {
            "Always Flags"
        }
        async fn execute(&self, ctx: &UrlContext<'_>, _cancel: &CancellationToken) {
            ctx.emit_finding("always-flags", Severity::Info, "TEST", "always fires", None);
        }
    }

    fn sample_ctx<'a>(facts: &'a PageFacts, settings: &'a ProjectSettings) -> UrlContext<'a> {
        UrlContext::new(
            1,
            1,
            UrlMetadata {
                url: Url::parse("https://example.com/").unwrap(),
                depth: 0,
                http_status: Some(200),
                headers: HashMap::new(),
            },
            None,
            None,
            facts,
            settings,
        )
    }

    #[tokio::test]
    async fn registry_runs_registered_analyzers() {
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(AlwaysFlags));

        let facts = PageFacts::default();
        let settings = ProjectSettings::default();
        let ctx = sample_ctx(&facts, &settings);
        let cancel = CancellationToken::new();

        registry.run_all(&ctx, &cancel).await;
        let (findings, _, _) = ctx.take_findings();
        assert_eq!(findings.len(), 1);
    }

    #[tokio::test]
    async fn empty_registry_runs_nothing() {
        let registry = PluginRegistry::new();
        let facts = PageFacts::default();
        let settings = ProjectSettings::default();
        let ctx = sample_ctx(&facts, &settings);
        let cancel = CancellationToken::new();

        registry.run_all(&ctx, &cancel).await;
        let (findings, rows, enqueued) = ctx.take_findings();
        assert!(findings.is_empty() && rows.is_empty() && enqueued.is_empty());
    }
}
