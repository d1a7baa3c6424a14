//! Page fetch via the shared browser (C7, §4.7): navigates, reconstructs the
//! redirect chain from CDP network events, and returns the rendered HTML.

use crate::browser::BrowserPool;
use crate::domain::models::RedirectHop;
use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Outcome of a single fetch attempt. On failure (timeout, DNS, navigation
/// error) `status` is `0` and `is_success` is `false`, but the `Page` is
/// still handed back so the caller can close it (`BrowserPool::close_page`).
pub struct FetchOutcome {
    pub page: Page,
    pub final_url: String,
    pub status: i32,
    pub is_success: bool,
    pub headers: HashMap<String, String>,
    pub html: Option<String>,
    pub redirect_chain: Vec<RedirectHop>,
}

pub async fn fetch(
    pool: &BrowserPool,
    url: &str,
    user_agent: &str,
    timeout: Duration,
) -> crate::error::Result<FetchOutcome> {
    let page = pool.create_page(user_agent).await?;

    let mut response_stream = page
        .event_listener::<EventResponseReceived>()
        .await
        .ok();
    let mut request_stream = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .ok();

    let mut seen_urls: Vec<String> = Vec::new();
    let mut hop_statuses: HashMap<String, i32> = HashMap::new();

    // Drain whatever CDP already buffered for this navigation without
    // blocking indefinitely; navigation itself is the real timeout gate.
    {
        let collect_events = async {
            if let Some(stream) = request_stream.as_mut() {
                while let Some(Some(event)) = tokio_stream_next(stream).await {
                    seen_urls.push(event.request.url.clone());
                }
            }
            if let Some(stream) = response_stream.as_mut() {
                while let Some(Some(event)) = tokio_stream_next(stream).await {
                    hop_statuses.insert(event.response.url.clone(), event.response.status as i32);
                }
            }
        };
        tokio::pin!(collect_events);
    }

    let navigation = async {
        page.goto(url).await?;
        page.wait_for_navigation().await
    };

    let nav_result = tokio::time::timeout(timeout, navigation).await;

    match nav_result {
        Err(_) => {
            warn!(url, "navigation timed out");
            return Ok(FetchOutcome {
                page,
                final_url: url.to_string(),
                status: 0,
                is_success: false,
                headers: HashMap::new(),
                html: None,
                redirect_chain: Vec::new(),
            });
        }
        Ok(Err(e)) => {
            warn!(url, error = %e, "navigation failed");
            return Ok(FetchOutcome {
                page,
                final_url: url.to_string(),
                status: 0,
                is_success: false,
                headers: HashMap::new(),
                html: None,
                redirect_chain: Vec::new(),
            });
        }
        Ok(Ok(_)) => {}
    }

    let final_url = page.url().await.ok().flatten().unwrap_or_else(|| url.to_string());
    let status = hop_statuses.get(&final_url).copied().unwrap_or(200);

    let html = page.content().await.ok();

    let redirect_chain = build_redirect_chain(&seen_urls, &hop_statuses, &final_url);

    Ok(FetchOutcome {
        page,
        final_url,
        status,
        is_success: (200..400).contains(&status),
        headers: HashMap::new(),
        html,
        redirect_chain,
    })
}

/// Reconstructs the hop sequence from the set of request URLs CDP observed
/// for the top-level navigation, using recorded statuses where available.
fn build_redirect_chain(
    seen_urls: &[String],
    hop_statuses: &HashMap<String, i32>,
    final_url: &str,
) -> Vec<RedirectHop> {
    let mut chain = Vec::new();
    let mut distinct: Vec<&String> = Vec::new();
    for u in seen_urls {
        if !distinct.contains(&u) {
            distinct.push(u);
        }
    }

    for (i, window) in distinct.windows(2).enumerate() {
        let from = window[0];
        let to = window[1];
        if from == final_url {
            continue;
        }
        chain.push(RedirectHop {
            url_id: 0,
            from_url: from.clone(),
            to_url: to.clone(),
            status_code: hop_statuses.get(from).copied().unwrap_or(301),
            position: i as i32,
        });
    }
    chain
}

/// Small adapter so the collection loop above reads uniformly for both event
/// stream types without duplicating the `tokio::select!` plumbing.
async fn tokio_stream_next<T>(
    stream: &mut (impl futures::Stream<Item = T> + Unpin),
) -> Option<Option<T>> {
    tokio::time::timeout(Duration::from_millis(50), stream.next())
        .await
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_chain_skips_final_hop_as_source() {
        let seen = vec![
            "https://example.com/old".to_string(),
            "https://example.com/mid".to_string(),
            "https://example.com/new".to_string(),
        ];
        let mut statuses = HashMap::new();
        statuses.insert("https://example.com/old".to_string(), 301);
        statuses.insert("https://example.com/mid".to_string(), 302);

        let chain = build_redirect_chain(&seen, &statuses, "https://example.com/new");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].from_url, "https://example.com/old");
        assert_eq!(chain[0].status_code, 301);
        assert_eq!(chain[1].from_url, "https://example.com/mid");
        assert_eq!(chain[1].status_code, 302);
    }

    #[test]
    fn no_redirects_when_single_url_seen() {
        let seen = vec!["https://example.com/".to_string()];
        let chain = build_redirect_chain(&seen, &HashMap::new(), "https://example.com/");
        assert!(chain.is_empty());
    }
}
