//! Sitemap discovery (C3, §4.3): robots-declared + common-path probing,
//! recursive sitemap-index expansion, bounded URL collection.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;
use url::Url;

const SITEMAP_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_SITEMAP_URLS: usize = 50_000;

const COMMON_SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap.xml.gz"];

enum SitemapKind {
    Index,
    UrlSet,
}

fn detect_kind(body: &str) -> SitemapKind {
    if body.contains("<sitemapindex") {
        SitemapKind::Index
    } else {
        SitemapKind::UrlSet
    }
}

/// Walk `<loc>` tags out of a sitemap XML document, regardless of whether it's
/// a `<urlset>` (page URLs) or `<sitemapindex>` (nested sitemap URLs).
fn extract_locs(body: &str) -> Vec<String> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut locs = Vec::new();
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"loc" => in_loc = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(t)) if in_loc => {
                if let Ok(text) = t.unescape() {
                    locs.push(text.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "malformed sitemap XML, stopping parse at failure point");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    locs
}

pub struct SitemapDiscoverer {
    client: reqwest::Client,
}

impl SitemapDiscoverer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SITEMAP_FETCH_TIMEOUT)
                .build()
                .expect("failed to build sitemap HTTP client"),
        }
    }

    async fn fetch(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(_) => None,
            Err(e) => {
                warn!(url, error = %e, "sitemap document fetch failed, skipping");
                None
            }
        }
    }

    /// Discover page URLs reachable via sitemaps for `base_url`, seeded from
    /// `robots_sitemaps` (declared via `Sitemap:` directives) and, failing
    /// that, a fixed list of common sitemap paths. Recurses into sitemap
    /// indexes. Per-document failures are non-fatal; collection stops once
    /// `MAX_SITEMAP_URLS` page URLs have been gathered.
    pub async fn discover(&self, base_url: &Url, robots_sitemaps: &[String]) -> Vec<Url> {
        let mut seeds: Vec<String> = robots_sitemaps.to_vec();
        if seeds.is_empty() {
            for path in COMMON_SITEMAP_PATHS {
                if let Ok(candidate) = base_url.join(path) {
                    seeds.push(candidate.into());
                }
            }
        }

        let mut visited = HashSet::new();
        let mut queue: Vec<String> = seeds;
        let mut found = Vec::new();

        while let Some(sitemap_url) = queue.pop() {
            if found.len() >= MAX_SITEMAP_URLS {
                warn!(cap = MAX_SITEMAP_URLS, "sitemap URL cap reached, stopping discovery");
                break;
            }
            if !visited.insert(sitemap_url.clone()) {
                continue;
            }

            let Some(body) = self.fetch(&sitemap_url).await else {
                continue;
            };

            let locs = extract_locs(&body);
            match detect_kind(&body) {
                SitemapKind::Index => queue.extend(locs),
                SitemapKind::UrlSet => {
                    for loc in locs {
                        if found.len() >= MAX_SITEMAP_URLS {
                            break;
                        }
                        if let Ok(parsed) = Url::parse(&loc) {
                            found.push(parsed);
                        }
                    }
                }
            }
        }

        found
    }
}

impl Default for SitemapDiscoverer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_index_vs_urlset() {
        let index = r#"<?xml version="1.0"?><sitemapindex><sitemap><loc>https://example.com/a.xml</loc></sitemap></sitemapindex>"#;
        let urlset = r#"<?xml version="1.0"?><urlset><url><loc>https://example.com/page</loc></url></urlset>"#;
        assert!(matches!(detect_kind(index), SitemapKind::Index));
        assert!(matches!(detect_kind(urlset), SitemapKind::UrlSet));
    }

    #[test]
    fn extracts_locs_from_urlset() {
        let body = r#"<urlset><url><loc>https://example.com/a</loc></url><url><loc>https://example.com/b</loc></url></urlset>"#;
        let locs = extract_locs(body);
        assert_eq!(locs, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn extracts_locs_from_index() {
        let body = r#"<sitemapindex><sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap></sitemapindex>"#;
        let locs = extract_locs(body);
        assert_eq!(locs, vec!["https://example.com/sitemap-1.xml"]);
    }

    #[test]
    fn malformed_xml_does_not_panic() {
        let body = "<urlset><url><loc>https://example.com/a</loc>";
        let locs = extract_locs(body);
        assert!(locs.contains(&"https://example.com/a".to_string()));
    }

    #[tokio::test]
    async fn discover_follows_robots_declared_sitemap() {
        let mut server = mockito::Server::new_async().await;
        let base = Url::parse(&server.url()).unwrap();

        let sitemap_path = "/my-sitemap.xml";
        let sitemap_url = format!("{}{}", server.url(), sitemap_path);
        let body = format!(
            r#"<urlset><url><loc>{}page-1</loc></url></urlset>"#,
            server.url()
        );

        let _m = server
            .mock("GET", sitemap_path)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let discoverer = SitemapDiscoverer::new();
        let urls = discoverer.discover(&base, &[sitemap_url]).await;
        assert_eq!(urls.len(), 1);
        assert!(urls[0].as_str().ends_with("page-1"));
    }

    #[tokio::test]
    async fn discover_falls_back_to_common_paths() {
        let mut server = mockito::Server::new_async().await;
        let base = Url::parse(&server.url()).unwrap();

        let body = format!(r#"<urlset><url><loc>{}home</loc></url></urlset>"#, server.url());
        let _m = server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let discoverer = SitemapDiscoverer::new();
        let urls = discoverer.discover(&base, &[]).await;
        assert_eq!(urls.len(), 1);
    }
}
