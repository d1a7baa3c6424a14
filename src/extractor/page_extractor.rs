//! Pure HTML -> `PageFacts` extraction (C8, §4.8). Takes already-fetched
//! HTML, lowercased response headers, and the page's resolved URL; produces
//! no side effects and performs no I/O.

use crate::domain::models::{Hreflang, HreflangSource, PageFacts, RobotsSource, StructuredData};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

fn title_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("title").unwrap())
}
fn meta_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("meta").unwrap())
}
fn link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("link").unwrap())
}
fn html_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("html").unwrap())
}
fn script_ld_json_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap())
}

fn meta_refresh_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(\d+)\s*(?:;\s*url\s*=\s*(.+))?$").unwrap())
}

/// Expands the `none` pseudo-directive into its constituent directives
/// (shared semantics with the robots.txt `none`-expansion law, §8).
fn apply_robots_token(token: &str, flags: &mut RobotsFlags) {
    match token {
        "noindex" => flags.noindex = Some(true),
        "nofollow" => flags.nofollow = Some(true),
        "noarchive" => flags.noarchive = Some(true),
        "nosnippet" => flags.nosnippet = Some(true),
        "noimageindex" => flags.noimageindex = Some(true),
        "none" => {
            flags.noindex = Some(true);
            flags.nofollow = Some(true);
        }
        "all" | "index" | "follow" => {}
        _ => {}
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RobotsFlags {
    noindex: Option<bool>,
    nofollow: Option<bool>,
    noarchive: Option<bool>,
    nosnippet: Option<bool>,
    noimageindex: Option<bool>,
}

fn parse_robots_directives(content: &str) -> RobotsFlags {
    let mut flags = RobotsFlags::default();
    for token in content.split(',') {
        apply_robots_token(token.trim().to_lowercase().as_str(), &mut flags);
    }
    flags
}

fn merge_restrictive(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

fn flags_conflict(meta: &RobotsFlags, http: &RobotsFlags) -> bool {
    let pairs = [
        (meta.noindex, http.noindex),
        (meta.nofollow, http.nofollow),
        (meta.noarchive, http.noarchive),
        (meta.nosnippet, http.nosnippet),
        (meta.noimageindex, http.noimageindex),
    ];
    pairs
        .iter()
        .any(|(a, b)| matches!((a, b), (Some(x), Some(y)) if x != y))
}

/// Extracts SEO-relevant facts from rendered HTML plus response headers.
pub fn extract(html: &str, headers: &HashMap<String, String>, current_url: &Url) -> PageFacts {
    let doc = Html::parse_document(html);
    let mut facts = PageFacts::default();

    facts.title = doc
        .select(title_selector())
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    for meta in doc.select(meta_selector()) {
        let name = meta.value().attr("name").unwrap_or_default().to_lowercase();
        let http_equiv = meta.value().attr("http-equiv").unwrap_or_default().to_lowercase();
        let content = meta.value().attr("content").unwrap_or_default();

        if name == "description" {
            facts.meta_description = Some(content.trim().to_string());
        }
        if http_equiv == "refresh" {
            if let Some(caps) = meta_refresh_regex().captures(content) {
                facts.has_meta_refresh = true;
                facts.meta_refresh_delay = caps.get(1).and_then(|m| m.as_str().parse().ok());
                facts.meta_refresh_target = caps
                    .get(2)
                    .map(|m| m.as_str().trim().trim_matches('\'').trim_matches('"').to_string());
            }
        }
    }

    let mut canonical_hrefs = Vec::new();
    for link in doc.select(link_selector()) {
        let rel = link.value().attr("rel").unwrap_or_default().to_lowercase();
        if rel == "canonical" {
            if let Some(href) = link.value().attr("href") {
                canonical_hrefs.push(href.to_string());
            }
        }
    }
    facts.has_multiple_canonicals = canonical_hrefs.len() > 1;
    facts.canonical_html = canonical_hrefs
        .first()
        .and_then(|href| current_url.join(href).ok())
        .map(|u| u.to_string());

    if facts.has_multiple_canonicals {
        facts
            .canonical_issues
            .push("Multiple canonical tags in HTML".to_string());
    }

    if let Some(canonical) = &facts.canonical_html {
        if let Ok(resolved) = Url::parse(canonical) {
            if resolved.host_str() != current_url.host_str() {
                facts.has_cross_domain_canonical = true;
            }
        }
    }

    if let Some(link_header) = headers.get("link") {
        facts.link_header = Some(link_header.clone());
        if let Some(target) = extract_canonical_from_link_header(link_header) {
            facts.canonical_http = current_url.join(&target).ok().map(|u| u.to_string());
        }
    }

    if let (Some(html_canon), Some(http_canon)) = (&facts.canonical_html, &facts.canonical_http) {
        if html_canon != http_canon {
            facts
                .canonical_issues
                .push("HTML and HTTP canonical differ".to_string());
        }
    }

    let meta_robots_content = doc
        .select(meta_selector())
        .find(|m| m.value().attr("name").unwrap_or_default().eq_ignore_ascii_case("robots"))
        .and_then(|m| m.value().attr("content"))
        .map(|s| s.to_string());

    let http_robots = headers.get("x-robots-tag").cloned();
    facts.x_robots_tag = http_robots.clone();

    let meta_flags = meta_robots_content.as_deref().map(parse_robots_directives);
    let http_flags = http_robots.as_deref().map(parse_robots_directives);

    facts.robots_source = match (meta_flags.is_some(), http_flags.is_some()) {
        (true, true) => RobotsSource::Both,
        (true, false) => RobotsSource::Meta,
        (false, true) => RobotsSource::Http,
        (false, false) => RobotsSource::None,
    };

    if let (Some(m), Some(h)) = (&meta_flags, &http_flags) {
        facts.has_robots_conflict = flags_conflict(m, h);
    }

    let merged = merge_flags(meta_flags, http_flags);
    facts.robots_noindex = merged.noindex;
    facts.robots_nofollow = merged.nofollow;
    facts.robots_noarchive = merged.noarchive;
    facts.robots_nosnippet = merged.nosnippet;
    facts.robots_noimageindex = merged.noimageindex;

    facts.html_lang = doc
        .select(html_selector())
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(str::to_string);
    facts.content_language_header = headers.get("content-language").cloned();

    facts.cache_control = headers.get("cache-control").cloned();
    facts.vary = headers.get("vary").cloned();
    facts.content_encoding = headers.get("content-encoding").cloned();
    facts.has_hsts = headers.contains_key("strict-transport-security");

    facts
}

fn merge_flags(meta: Option<RobotsFlags>, http: Option<RobotsFlags>) -> RobotsFlags {
    let m = meta.unwrap_or_default();
    let h = http.unwrap_or_default();
    RobotsFlags {
        noindex: merge_restrictive(m.noindex, h.noindex),
        nofollow: merge_restrictive(m.nofollow, h.nofollow),
        noarchive: merge_restrictive(m.noarchive, h.noarchive),
        nosnippet: merge_restrictive(m.nosnippet, h.nosnippet),
        noimageindex: merge_restrictive(m.noimageindex, h.noimageindex),
    }
}

fn extract_canonical_from_link_header(value: &str) -> Option<String> {
    for part in value.split(',') {
        if part.contains("rel=\"canonical\"") || part.contains("rel=canonical") {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            return Some(part[start..end].to_string());
        }
    }
    None
}

/// hreflang alternates declared via `<link rel=alternate hreflang=...>` in
/// the HTML and `Link:` response headers (§4.8). URLs are resolved against
/// `current_url`.
pub fn extract_hreflangs(html: &str, headers: &HashMap<String, String>, current_url: &Url) -> Vec<Hreflang> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();

    for link in doc.select(link_selector()) {
        let rel = link.value().attr("rel").unwrap_or_default().to_lowercase();
        if rel != "alternate" {
            continue;
        }
        let Some(lang) = link.value().attr("hreflang") else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = current_url.join(href) else {
            continue;
        };
        out.push(Hreflang {
            url_id: 0,
            language_code: lang.to_string(),
            target_url: resolved.to_string(),
            source: HreflangSource::Html,
            is_x_default: lang.eq_ignore_ascii_case("x-default"),
        });
    }

    if let Some(link_header) = headers.get("link") {
        for part in link_header.split(',') {
            if !part.contains("rel=\"alternate\"") && !part.contains("rel=alternate") {
                continue;
            }
            let Some(start) = part.find('<') else { continue };
            let Some(end) = part.find('>') else { continue };
            let href = &part[start + 1..end];
            let Ok(resolved) = current_url.join(href) else { continue };
            if let Some(lang_start) = part.find("hreflang=\"") {
                let rest = &part[lang_start + "hreflang=\"".len()..];
                if let Some(lang_end) = rest.find('"') {
                    let lang = &rest[..lang_end];
                    out.push(Hreflang {
                        url_id: 0,
                        language_code: lang.to_string(),
                        target_url: resolved.to_string(),
                        source: HreflangSource::Http,
                        is_x_default: lang.eq_ignore_ascii_case("x-default"),
                    });
                }
            }
        }
    }

    out
}

/// `<script type="application/ld+json">` blocks, parsed enough to recover a
/// `@type` and validity flag. Invalid JSON is recorded, not discarded.
pub fn extract_structured_data(html: &str) -> Vec<StructuredData> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();

    for script in doc.select(script_ld_json_selector()) {
        let raw: String = script.text().collect();
        let raw = raw.trim().to_string();
        if raw.is_empty() {
            continue;
        }

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => {
                let schema_type = value
                    .get("@type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown")
                    .to_string();
                out.push(StructuredData {
                    url_id: 0,
                    schema_type,
                    raw,
                    is_valid: true,
                    validation_errors: None,
                });
            }
            Err(e) => out.push(StructuredData {
                url_id: 0,
                schema_type: "Unknown".to_string(),
                raw,
                is_valid: false,
                validation_errors: Some(e.to_string()),
            }),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn extracts_title_and_meta_description() {
        let html = r#"<html><head><title>Hi</title><meta name="description" content="desc"></head></html>"#;
        let facts = extract(html, &HashMap::new(), &url("https://example.com/"));
        assert_eq!(facts.title, Some("Hi".to_string()));
        assert_eq!(facts.meta_description, Some("desc".to_string()));
    }

    #[test]
    fn detects_multiple_canonicals() {
        let html = r#"<html><head>
            <link rel="canonical" href="https://example.com/a">
            <link rel="canonical" href="https://example.com/b">
        </head></html>"#;
        let facts = extract(html, &HashMap::new(), &url("https://example.com/a"));
        assert!(facts.has_multiple_canonicals);
        assert!(facts
            .canonical_issues
            .contains(&"Multiple canonical tags in HTML".to_string()));
    }

    #[test]
    fn canonical_conflict_resolves_relative_hrefs_and_flags_differ() {
        let html = r#"<html><head>
            <link rel="canonical" href="/a">
            <link rel="canonical" href="/b">
        </head></html>"#;
        let mut headers = HashMap::new();
        headers.insert("link".to_string(), "</c>; rel=\"canonical\"".to_string());
        let facts = extract(html, &headers, &url("https://site/"));
        assert_eq!(facts.canonical_html, Some("https://site/a".to_string()));
        assert_eq!(facts.canonical_http, Some("https://site/c".to_string()));
        assert!(facts
            .canonical_issues
            .contains(&"Multiple canonical tags in HTML".to_string()));
        assert!(facts
            .canonical_issues
            .contains(&"HTML and HTTP canonical differ".to_string()));
    }

    #[test]
    fn detects_cross_domain_canonical() {
        let html = r#"<html><head><link rel="canonical" href="https://other.com/a"></head></html>"#;
        let facts = extract(html, &HashMap::new(), &url("https://example.com/a"));
        assert!(facts.has_cross_domain_canonical);
    }

    #[test]
    fn none_expands_to_noindex_and_nofollow() {
        let html = r#"<html><head><meta name="robots" content="none"></head></html>"#;
        let facts = extract(html, &HashMap::new(), &url("https://example.com/"));
        assert_eq!(facts.robots_noindex, Some(true));
        assert_eq!(facts.robots_nofollow, Some(true));
        assert_eq!(facts.robots_source, RobotsSource::Meta);
    }

    #[test]
    fn conflicting_meta_and_http_robots_flagged_restrictive_wins() {
        let html = r#"<html><head><meta name="robots" content="index"></head></html>"#;
        let mut headers = HashMap::new();
        headers.insert("x-robots-tag".to_string(), "noindex".to_string());
        let facts = extract(html, &headers, &url("https://example.com/"));
        assert_eq!(facts.robots_source, RobotsSource::Both);
        assert_eq!(facts.robots_noindex, Some(true));
        assert!(facts.has_robots_conflict);
    }

    #[test]
    fn meta_refresh_parses_delay_and_target() {
        let html = r#"<html><head><meta http-equiv="refresh" content="5;url=https://example.com/next"></head></html>"#;
        let facts = extract(html, &HashMap::new(), &url("https://example.com/"));
        assert!(facts.has_meta_refresh);
        assert_eq!(facts.meta_refresh_delay, Some(5));
        assert_eq!(facts.meta_refresh_target, Some("https://example.com/next".to_string()));
    }

    #[test]
    fn structured_data_flags_invalid_json() {
        let html = r#"<script type="application/ld+json">{not json}</script>"#;
        let out = extract_structured_data(html);
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_valid);
    }

    #[test]
    fn structured_data_extracts_schema_type() {
        let html = r#"<script type="application/ld+json">{"@type": "Article"}</script>"#;
        let out = extract_structured_data(html);
        assert_eq!(out[0].schema_type, "Article");
        assert!(out[0].is_valid);
    }

    #[test]
    fn hreflang_collected_from_html_and_header() {
        let html = r#"<html><head><link rel="alternate" hreflang="es" href="https://example.com/es"></head></html>"#;
        let mut headers = HashMap::new();
        headers.insert(
            "link".to_string(),
            "<https://example.com/fr>; rel=\"alternate\"; hreflang=\"fr\"".to_string(),
        );
        let out = extract_hreflangs(html, &headers, &url("https://example.com/"));
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|h| h.language_code == "es" && h.source == HreflangSource::Html));
        assert!(out.iter().any(|h| h.language_code == "fr" && h.source == HreflangSource::Http));
    }
}
