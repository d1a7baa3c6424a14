//! Per-origin robots.txt cache and parser (C2, §4.2).

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ORIGINS: usize = 10_000;

#[derive(Debug, Clone)]
struct Rule {
    user_agent: String,
    path: String,
    allow: bool,
}

#[derive(Debug, Clone, Default)]
struct RobotsRecord {
    rules: Vec<Rule>,
    crawl_delays: Vec<(String, f64)>,
    sitemaps: Vec<String>,
    cached_at: Option<Instant>,
}

impl RobotsRecord {
    fn allow_all() -> Self {
        Self::default()
    }

    /// Longest-prefix-wins rule matching, restricted to rules applying to `ua`
    /// (exact `*` or case-insensitive substring match against the caller's UA).
    fn is_allowed(&self, path: &str, ua: &str) -> bool {
        let ua_lower = ua.to_lowercase();
        let mut best: Option<&Rule> = None;

        for rule in &self.rules {
            let applies = rule.user_agent == "*" || ua_lower.contains(&rule.user_agent);
            if !applies || !path.starts_with(&rule.path) {
                continue;
            }
            match best {
                Some(b) if b.path.len() >= rule.path.len() => {}
                _ => best = Some(rule),
            }
        }

        match best {
            Some(rule) => rule.allow,
            None => true,
        }
    }

    fn crawl_delay(&self, ua: &str) -> Option<f64> {
        let ua_lower = ua.to_lowercase();
        self.crawl_delays
            .iter()
            .find(|(agent, _)| agent != "*" && ua_lower.contains(agent.as_str()))
            .or_else(|| self.crawl_delays.iter().find(|(agent, _)| agent == "*"))
            .map(|(_, delay)| *delay)
    }
}

/// Parse a robots.txt document into rules + crawl-delays + sitemap directives.
fn parse_robots_txt(body: &str) -> RobotsRecord {
    let mut rules = Vec::new();
    let mut crawl_delays = Vec::new();
    let mut sitemaps = Vec::new();
    let mut current_agents: Vec<String> = Vec::new();
    let mut agents_open = false;

    for raw_line in body.lines() {
        let line = match raw_line.split_once('#') {
            Some((before, _)) => before,
            None => raw_line,
        }
        .trim();

        if line.is_empty() {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if !agents_open {
                    current_agents.clear();
                }
                current_agents.push(value.to_lowercase());
                agents_open = true;
            }
            "disallow" => {
                agents_open = false;
                if !value.is_empty() {
                    for agent in &current_agents {
                        rules.push(Rule {
                            user_agent: agent.clone(),
                            path: value.to_string(),
                            allow: false,
                        });
                    }
                }
            }
            "allow" => {
                agents_open = false;
                if !value.is_empty() {
                    for agent in &current_agents {
                        rules.push(Rule {
                            user_agent: agent.clone(),
                            path: value.to_string(),
                            allow: true,
                        });
                    }
                }
            }
            "crawl-delay" => {
                agents_open = false;
                if let Ok(delay) = value.parse::<f64>() {
                    for agent in &current_agents {
                        crawl_delays.push((agent.clone(), delay));
                    }
                }
            }
            "sitemap" => {
                sitemaps.push(value.to_string());
            }
            _ => {}
        }
    }

    RobotsRecord {
        rules,
        crawl_delays,
        sitemaps,
        cached_at: Some(Instant::now()),
    }
}

pub struct RobotsCache {
    client: reqwest::Client,
    origins: Arc<DashMap<String, RobotsRecord>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(ROBOTS_FETCH_TIMEOUT)
                .build()
                .expect("failed to build robots HTTP client"),
            origins: Arc::new(DashMap::new()),
        }
    }

    fn origin_of(url: &Url) -> String {
        format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""))
    }

    async fn record_for(&self, url: &Url) -> RobotsRecord {
        let origin = Self::origin_of(url);

        if let Some(existing) = self.origins.get(&origin) {
            return existing.clone();
        }

        let record = self.fetch_and_parse(&origin).await;
        self.evict_if_needed();
        self.origins.insert(origin, record.clone());
        record
    }

    async fn fetch_and_parse(&self, origin: &str) -> RobotsRecord {
        let robots_url = format!("{origin}/robots.txt");
        match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => parse_robots_txt(&body),
                Err(_) => RobotsRecord::allow_all(),
            },
            _ => RobotsRecord::allow_all(),
        }
    }

    /// Bounded to 10,000 origins; on overflow, evict the oldest half by cache time.
    fn evict_if_needed(&self) {
        if self.origins.len() < MAX_ORIGINS {
            return;
        }
        let mut entries: Vec<(String, Instant)> = self
            .origins
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().cached_at.unwrap_or_else(Instant::now)))
            .collect();
        entries.sort_by_key(|(_, t)| *t);
        for (key, _) in entries.into_iter().take(self.origins.len() / 2) {
            self.origins.remove(&key);
        }
    }

    /// Whether `url`'s path is allowed for `user_agent`.
    pub async fn allowed(&self, url: &Url, user_agent: &str) -> bool {
        let record = self.record_for(url).await;
        record.is_allowed(url.path(), user_agent)
    }

    /// Crawl-delay directive for the origin, if any (specific UA wins over `*`).
    pub async fn crawl_delay(&self, url: &Url, user_agent: &str) -> Option<f64> {
        let record = self.record_for(url).await;
        record.crawl_delay(user_agent)
    }

    /// `sitemap:` directives declared in the origin's robots.txt (for C3).
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        let record = self.record_for(url).await;
        record.sitemaps
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ruleset_allows_everything() {
        let record = parse_robots_txt("");
        assert!(record.is_allowed("/anything", "AnyBot"));
    }

    #[test]
    fn disallow_prefix_denies() {
        let record = parse_robots_txt("User-agent: *\nDisallow: /private/\n");
        assert!(!record.is_allowed("/private/x", "AnyBot"));
        assert!(record.is_allowed("/public/x", "AnyBot"));
    }

    #[test]
    fn longest_prefix_wins() {
        let record = parse_robots_txt(
            "User-agent: *\nDisallow: /a/\nAllow: /a/b/\n",
        );
        assert!(!record.is_allowed("/a/x", "AnyBot"));
        assert!(record.is_allowed("/a/b/x", "AnyBot"));
    }

    #[test]
    fn specific_ua_beats_wildcard_for_crawl_delay() {
        let record = parse_robots_txt(
            "User-agent: *\nCrawl-delay: 5\n\nUser-agent: MyBot\nCrawl-delay: 1\n",
        );
        assert_eq!(record.crawl_delay("MyBot/1.0"), Some(1.0));
        assert_eq!(record.crawl_delay("OtherBot"), Some(5.0));
    }

    #[test]
    fn collects_sitemap_directives() {
        let record = parse_robots_txt("Sitemap: https://example.com/sitemap.xml\n");
        assert_eq!(record.sitemaps, vec!["https://example.com/sitemap.xml".to_string()]);
    }

    #[test]
    fn comments_are_stripped() {
        let record = parse_robots_txt("# comment\nUser-agent: *  # trailing\nDisallow: /x # inline\n");
        assert!(!record.is_allowed("/x", "AnyBot"));
    }
}
