//! Progress reporting (§6, §9): `CrawlProgress` modeled as a broadcast
//! channel the reporter writes to and subscribers (CLI progress bar, tests)
//! read from, instead of a GUI event bus.

use tokio::sync::broadcast;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

const REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Mirrors spec §6's `CrawlProgress` event, emitted at >=2 Hz and once more
/// on completion.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub urls_crawled: i64,
    pub total_discovered: i64,
    pub queue_size: i64,
    pub active_workers: i64,
    pub error_count: i64,
    pub elapsed: Duration,
    pub last_crawled_url: Option<String>,
}

fn reason_phrase(status_code: i32) -> Option<&'static str> {
    match status_code {
        200 => Some("OK"),
        201 => Some("Created"),
        204 => Some("No Content"),
        301 => Some("Moved Permanently"),
        302 => Some("Found"),
        304 => Some("Not Modified"),
        400 => Some("Bad Request"),
        401 => Some("Unauthorized"),
        403 => Some("Forbidden"),
        404 => Some("Not Found"),
        500 => Some("Internal Server Error"),
        502 => Some("Bad Gateway"),
        503 => Some("Service Unavailable"),
        _ => None,
    }
}

fn status_text(status_code: i32) -> String {
    if status_code == 0 {
        return "Connection Failed".to_string();
    }
    match reason_phrase(status_code) {
        Some(phrase) => format!("{status_code} {phrase}"),
        None => status_code.to_string(),
    }
}

/// Decorates a freshly-crawled URL with its status marker, per §6:
/// `"✓ {url} ({status_text})"` for 2xx, `"✗ {url} ({status_text})"` otherwise.
pub fn decorate_last_crawled_url(url: &str, status_code: i32) -> String {
    let marker = if (200..300).contains(&status_code) { "\u{2713}" } else { "\u{2717}" };
    format!("{marker} {url} ({})", status_text(status_code))
}

pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressUpdate>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    /// Emits a snapshot every `REPORT_INTERVAL` until `cancel` fires, plus a
    /// final snapshot right before returning (§6: "once on completion").
    /// `sample` is called fresh each tick so counts reflect current
    /// frontier/url state.
    pub async fn run<F>(&self, cancel: CancellationToken, mut sample: F)
    where
        F: FnMut() -> ProgressUpdate,
    {
        let mut ticker = interval(REPORT_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let update = sample();
                    let _ = self.sender.send(update);
                }
            }
        }
        let _ = self.sender.send(sample());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decorates_success_status_with_checkmark_and_reason_phrase() {
        let decorated = decorate_last_crawled_url("https://example.com/", 200);
        assert_eq!(decorated, "\u{2713} https://example.com/ (200 OK)");
    }

    #[test]
    fn decorates_failure_status_with_cross_and_reason_phrase() {
        let decorated = decorate_last_crawled_url("https://example.com/missing", 404);
        assert_eq!(decorated, "\u{2717} https://example.com/missing (404 Not Found)");
    }

    #[test]
    fn decorates_connection_failure_as_zero_status() {
        let decorated = decorate_last_crawled_url("https://example.com/", 0);
        assert_eq!(decorated, "\u{2717} https://example.com/ (Connection Failed)");
    }

    #[test]
    fn unknown_status_code_renders_as_bare_integer() {
        let decorated = decorate_last_crawled_url("https://example.com/", 418);
        assert_eq!(decorated, "\u{2717} https://example.com/ (418)");
    }
}
