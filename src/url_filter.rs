//! URL normalization and same-site filtering (C1, §4.1).

use url::Url as ParsedUrl;

const BINARY_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "wmv", "flv", "mkv", "webm", "m4v", "mpg", "mpeg", "mp3", "wav", "ogg",
    "m4a", "aac", "flac", "wma", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar",
    "7z", "tar", "gz", "bz2", "psd", "ai", "svg", "exe", "dll", "so", "dylib", "bin", "dmg", "iso",
    "ttf", "otf", "woff", "woff2", "eot",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Unparsable,
    UnsupportedScheme,
    DifferentSite,
    BinaryExtension,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::Unparsable => "unparsable URL",
            RejectReason::UnsupportedScheme => "non-http(s) scheme",
            RejectReason::DifferentSite => "different site",
            RejectReason::BinaryExtension => "binary/media extension",
        };
        write!(f, "{s}")
    }
}

/// Strips a single leading `www.` and lowercases, for the same-site test (§3).
pub fn strip_www(host: &str) -> String {
    let host = host.to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Same-site test per §3: hosts equal modulo a leading `www.`, case-insensitive.
pub fn is_same_site(a: &str, b: &str) -> bool {
    strip_www(a) == strip_www(b)
}

fn has_binary_extension(path: &str) -> bool {
    let lower = path.to_lowercase();
    let Some(last_segment) = lower.rsplit('/').next() else {
        return false;
    };
    match last_segment.rsplit_once('.') {
        Some((_, ext)) => BINARY_EXTENSIONS.contains(&ext),
        None => false,
    }
}

/// Resolve `candidate` against `current` honoring `<base>` semantics and
/// scheme-relative URLs, then strip the fragment. Returns `None` if the
/// candidate cannot be resolved to an absolute URL at all.
pub fn resolve(current: &ParsedUrl, base_href: Option<&ParsedUrl>, candidate: &str) -> Option<ParsedUrl> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    let resolve_base = base_href.unwrap_or(current);

    let mut resolved = if let Some(rest) = candidate.strip_prefix("//") {
        let scheme = resolve_base.scheme();
        ParsedUrl::parse(&format!("{scheme}://{rest}")).ok()?
    } else {
        resolve_base.join(candidate).ok()?
    };

    resolved.set_fragment(None);
    Some(resolved)
}

/// Normalize and filter a candidate URL against the project's base URL.
/// Returns the normalized absolute URL, or a rejection reason (§4.1).
pub fn normalize_and_filter(candidate: &ParsedUrl, base_url: &ParsedUrl) -> Result<ParsedUrl, RejectReason> {
    if candidate.scheme() != "http" && candidate.scheme() != "https" {
        return Err(RejectReason::UnsupportedScheme);
    }

    let candidate_host = candidate.host_str().ok_or(RejectReason::Unparsable)?;
    let base_host = base_url.host_str().ok_or(RejectReason::Unparsable)?;
    if !is_same_site(candidate_host, base_host) {
        return Err(RejectReason::DifferentSite);
    }

    if has_binary_extension(candidate.path()) {
        return Err(RejectReason::BinaryExtension);
    }

    let mut normalized = candidate.clone();
    normalized.set_fragment(None);
    Ok(normalized)
}

/// `normalized_key = lowercase(scheme://host/path?query)`, fragment stripped (§3).
pub fn normalized_key(u: &ParsedUrl) -> String {
    let mut key = format!("{}://{}{}", u.scheme(), u.host_str().unwrap_or(""), u.path());
    if let Some(q) = u.query() {
        key.push('?');
        key.push_str(q);
    }
    key.to_lowercase()
}

/// `host_key = lowercase(host)` (§3).
pub fn host_key(u: &ParsedUrl) -> String {
    u.host_str().unwrap_or("").to_lowercase()
}
