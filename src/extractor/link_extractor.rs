//! Typed outbound link extraction (C9, §4.9): anchors, images, stylesheets,
//! scripts, each resolved against `<base>`/the page URL and typed.

use crate::domain::models::LinkType;
use crate::url_filter;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

fn base_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("base").unwrap())
}
fn anchor_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href]").unwrap())
}
fn img_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("img[src]").unwrap())
}
fn stylesheet_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("link[rel=stylesheet][href]").unwrap())
}
fn script_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("script[src]").unwrap())
}

fn is_skippable_scheme(href: &str) -> bool {
    let lower = href.trim().to_lowercase();
    lower.is_empty()
        || lower == "#"
        || lower.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
}

/// An extracted link, not yet resolved to a `Url`/`Link` row (that's done by
/// the caller once the target URL has been persisted and has an id).
pub struct ExtractedLink {
    pub target: Url,
    pub anchor_text: Option<String>,
    pub link_type: LinkType,
    pub rel: Option<String>,
    pub is_nofollow: bool,
    pub is_ugc: bool,
    pub is_sponsored: bool,
}

fn anchor_text_for(el: &scraper::ElementRef) -> Option<String> {
    let text: String = el.text().collect::<String>().trim().to_string();
    if !text.is_empty() {
        return Some(text);
    }
    if let Some(aria) = el.value().attr("aria-label") {
        if !aria.trim().is_empty() {
            return Some(aria.trim().to_string());
        }
    }
    if let Some(title) = el.value().attr("title") {
        if !title.trim().is_empty() {
            return Some(title.trim().to_string());
        }
    }
    el.select(&Selector::parse("img[alt]").unwrap())
        .next()
        .and_then(|img| img.value().attr("alt"))
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

/// Extracts every outbound link from `html`, resolved against `current_url`
/// (honoring an in-document `<base href>` if present).
pub fn extract(html: &str, current_url: &Url) -> Vec<ExtractedLink> {
    let doc = Html::parse_document(html);

    let base_href = doc
        .select(base_selector())
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| current_url.join(href).ok());

    let mut links = Vec::new();

    for a in doc.select(anchor_selector()) {
        let href = a.value().attr("href").unwrap_or_default();
        if is_skippable_scheme(href) {
            continue;
        }
        let Some(target) = url_filter::resolve(current_url, base_href.as_ref(), href) else {
            continue;
        };
        let rel = a.value().attr("rel").map(str::to_lowercase);
        let rel_tokens: Vec<&str> = rel.as_deref().unwrap_or("").split_whitespace().collect();
        links.push(ExtractedLink {
            target,
            anchor_text: anchor_text_for(&a),
            link_type: LinkType::Hyperlink,
            rel: rel.clone(),
            is_nofollow: rel_tokens.contains(&"nofollow"),
            is_ugc: rel_tokens.contains(&"ugc"),
            is_sponsored: rel_tokens.contains(&"sponsored"),
        });
    }

    for img in doc.select(img_selector()) {
        let src = img.value().attr("src").unwrap_or_default();
        if is_skippable_scheme(src) {
            continue;
        }
        let Some(target) = url_filter::resolve(current_url, base_href.as_ref(), src) else {
            continue;
        };
        links.push(ExtractedLink {
            target,
            anchor_text: img.value().attr("alt").map(str::to_string),
            link_type: LinkType::Image,
            rel: None,
            is_nofollow: false,
            is_ugc: false,
            is_sponsored: false,
        });
    }

    for link in doc.select(stylesheet_selector()) {
        let href = link.value().attr("href").unwrap_or_default();
        if is_skippable_scheme(href) {
            continue;
        }
        let Some(target) = url_filter::resolve(current_url, base_href.as_ref(), href) else {
            continue;
        };
        links.push(ExtractedLink {
            target,
            anchor_text: None,
            link_type: LinkType::Stylesheet,
            rel: None,
            is_nofollow: false,
            is_ugc: false,
            is_sponsored: false,
        });
    }

    for script in doc.select(script_selector()) {
        let src = script.value().attr("src").unwrap_or_default();
        if is_skippable_scheme(src) {
            continue;
        }
        let Some(target) = url_filter::resolve(current_url, base_href.as_ref(), src) else {
            continue;
        };
        links.push(ExtractedLink {
            target,
            anchor_text: None,
            link_type: LinkType::Script,
            rel: None,
            is_nofollow: false,
            is_ugc: false,
            is_sponsored: false,
        });
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn extracts_anchor_with_nofollow_rel() {
        let html = r#"<a href="/page" rel="nofollow">Go</a>"#;
        let links = extract(html, &url("https://example.com/"));
        assert_eq!(links.len(), 1);
        assert!(links[0].is_nofollow);
        assert_eq!(links[0].anchor_text, Some("Go".to_string()));
    }

    #[test]
    fn skips_javascript_mailto_tel_and_bare_hash() {
        let html = r##"
            <a href="javascript:void(0)">x</a>
            <a href="mailto:a@example.com">x</a>
            <a href="tel:+123">x</a>
            <a href="#">x</a>
        "##;
        let links = extract(html, &url("https://example.com/"));
        assert!(links.is_empty());
    }

    #[test]
    fn anchor_text_falls_back_to_nested_img_alt() {
        let html = r#"<a href="/page"><img src="/logo.png" alt="Logo"></a>"#;
        let links = extract(html, &url("https://example.com/"));
        let anchor = links.iter().find(|l| l.link_type == LinkType::Hyperlink).unwrap();
        assert_eq!(anchor.anchor_text, Some("Logo".to_string()));
    }

    #[test]
    fn honors_base_href_for_relative_resolution() {
        let html = r#"<base href="https://example.com/sub/"><a href="page.html">x</a>"#;
        let links = extract(html, &url("https://example.com/other/page.html"));
        assert_eq!(links[0].target.as_str(), "https://example.com/sub/page.html");
    }

    #[test]
    fn classifies_stylesheet_and_script_links() {
        let html = r#"<link rel="stylesheet" href="/s.css"><script src="/s.js"></script>"#;
        let links = extract(html, &url("https://example.com/"));
        assert!(links.iter().any(|l| l.link_type == LinkType::Stylesheet));
        assert!(links.iter().any(|l| l.link_type == LinkType::Script));
    }
}
