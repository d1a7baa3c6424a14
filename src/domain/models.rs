//! Domain entities for the crawl engine (§3 DATA MODEL).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PROJECT
// ============================================================================

/// A crawl project: a base URL plus settings. Owns every row keyed by its id;
/// deletion cascades through the child tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub settings: ProjectSettings,
    pub created_at: DateTime<Utc>,
}

/// User-agent preset or literal string (`§6 ProjectSettings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAgentSetting {
    Preset(UserAgentPreset),
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAgentPreset {
    Desktop,
    Mobile,
    Googlebot,
}

impl UserAgentSetting {
    pub fn resolve(&self) -> &str {
        match self {
            UserAgentSetting::Literal(s) => s,
            UserAgentSetting::Preset(UserAgentPreset::Desktop) => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            }
            UserAgentSetting::Preset(UserAgentPreset::Mobile) => {
                "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36"
            }
            UserAgentSetting::Preset(UserAgentPreset::Googlebot) => {
                "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub bypass_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub base_url: String,
    pub concurrent_requests: u32,
    pub max_crawl_depth: i32,
    pub max_urls_to_crawl: u32,
    pub crawl_delay_seconds: f64,
    pub timeout_seconds: u32,
    pub respect_robots_txt: bool,
    pub use_sitemap_xml: bool,
    pub user_agent: UserAgentSetting,
    pub proxy: Option<ProxyConfig>,
}

impl ProjectSettings {
    pub fn resolve_user_agent(&self) -> &str {
        self.user_agent.resolve()
    }
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            concurrent_requests: 4,
            max_crawl_depth: 5,
            max_urls_to_crawl: 500,
            crawl_delay_seconds: 0.5,
            timeout_seconds: 30,
            respect_robots_txt: true,
            use_sitemap_xml: true,
            user_agent: UserAgentSetting::Preset(UserAgentPreset::Desktop),
            proxy: None,
        }
    }
}

// ============================================================================
// FRONTIER ITEM (crawl_queue)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Queued => "Queued",
            QueueState::InProgress => "InProgress",
            QueueState::Completed => "Completed",
            QueueState::Failed => "Failed",
        }
    }
}

impl std::str::FromStr for QueueState {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(QueueState::Queued),
            "InProgress" => Ok(QueueState::InProgress),
            "Completed" => Ok(QueueState::Completed),
            "Failed" => Ok(QueueState::Failed),
            other => Err(anyhow::anyhow!("unknown queue state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlQueueItem {
    pub id: i64,
    pub project_id: i64,
    pub address: String,
    pub normalized_key: String,
    pub host_key: String,
    pub priority: i32,
    pub depth: i32,
    pub state: QueueState,
    pub enqueued_at: DateTime<Utc>,
}

/// A not-yet-persisted frontier item, as produced by discovery/link extraction.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub project_id: i64,
    pub address: String,
    pub normalized_key: String,
    pub host_key: String,
    pub priority: i32,
    pub depth: i32,
}

// ============================================================================
// URL + PAGEFACTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum UrlStatus {
    Pending,
    Completed,
    Failed,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Pending => "Pending",
            UrlStatus::Completed => "Completed",
            UrlStatus::Failed => "Failed",
        }
    }
}

impl std::str::FromStr for UrlStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(UrlStatus::Pending),
            "Completed" => Ok(UrlStatus::Completed),
            "Failed" => Ok(UrlStatus::Failed),
            other => Err(anyhow::anyhow!("unknown url status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotsSource {
    Meta,
    Http,
    Both,
    #[default]
    None,
}

impl RobotsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotsSource::Meta => "meta",
            RobotsSource::Http => "http",
            RobotsSource::Both => "both",
            RobotsSource::None => "none",
        }
    }
}

impl std::str::FromStr for RobotsSource {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta" => Ok(RobotsSource::Meta),
            "http" => Ok(RobotsSource::Http),
            "both" => Ok(RobotsSource::Both),
            "none" => Ok(RobotsSource::None),
            other => Err(anyhow::anyhow!("unknown robots source: {other}")),
        }
    }
}

/// SEO-relevant attributes extracted from a single rendered page (§4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageFacts {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_html: Option<String>,
    pub canonical_http: Option<String>,
    pub has_multiple_canonicals: bool,
    pub has_cross_domain_canonical: bool,
    pub canonical_issues: Vec<String>,

    pub robots_noindex: Option<bool>,
    pub robots_nofollow: Option<bool>,
    pub robots_noarchive: Option<bool>,
    pub robots_nosnippet: Option<bool>,
    pub robots_noimageindex: Option<bool>,
    pub robots_source: RobotsSource,
    pub x_robots_tag: Option<String>,
    pub has_robots_conflict: bool,

    pub html_lang: Option<String>,
    pub content_language_header: Option<String>,

    pub has_meta_refresh: bool,
    pub meta_refresh_delay: Option<i32>,
    pub meta_refresh_target: Option<String>,

    pub cache_control: Option<String>,
    pub vary: Option<String>,
    pub content_encoding: Option<String>,
    pub link_header: Option<String>,
    pub has_hsts: bool,

    pub redirect_target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Url {
    pub id: i64,
    pub project_id: i64,
    pub address: String,
    pub normalized_key: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub depth: i32,
    pub first_seen_at: DateTime<Utc>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub status: UrlStatus,
    pub http_status: Option<i32>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub robots_allowed: Option<bool>,
    pub discovered_from_url_id: Option<i64>,
    pub facts: PageFacts,
}

/// A Url row about to be inserted or updated.
#[derive(Debug, Clone)]
pub struct NewUrl {
    pub project_id: i64,
    pub address: String,
    pub normalized_key: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub depth: i32,
    pub status: UrlStatus,
    pub http_status: Option<i32>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub robots_allowed: Option<bool>,
    pub discovered_from_url_id: Option<i64>,
    pub facts: PageFacts,
}

// ============================================================================
// HEADER / REDIRECT / HREFLANG / STRUCTURED DATA
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub url_id: i64,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url_id: i64,
    pub from_url: String,
    pub to_url: String,
    pub status_code: i32,
    pub position: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HreflangSource {
    Html,
    Http,
}

impl HreflangSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HreflangSource::Html => "html",
            HreflangSource::Http => "http",
        }
    }
}

impl std::str::FromStr for HreflangSource {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(HreflangSource::Html),
            "http" => Ok(HreflangSource::Http),
            other => Err(anyhow::anyhow!("unknown hreflang source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hreflang {
    pub url_id: i64,
    pub language_code: String,
    pub target_url: String,
    pub source: HreflangSource,
    pub is_x_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredData {
    pub url_id: i64,
    pub schema_type: String,
    pub raw: String,
    pub is_valid: bool,
    pub validation_errors: Option<String>,
}

// ============================================================================
// LINK
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LinkType {
    Hyperlink,
    Image,
    Stylesheet,
    Script,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Hyperlink => "Hyperlink",
            LinkType::Image => "Image",
            LinkType::Stylesheet => "Stylesheet",
            LinkType::Script => "Script",
        }
    }
}

impl std::str::FromStr for LinkType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Hyperlink" => Ok(LinkType::Hyperlink),
            "Image" => Ok(LinkType::Image),
            "Stylesheet" => Ok(LinkType::Stylesheet),
            "Script" => Ok(LinkType::Script),
            other => Err(anyhow::anyhow!("unknown link type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub project_id: i64,
    pub from_url_id: i64,
    pub to_url_id: i64,
    pub anchor_text: Option<String>,
    pub link_type: LinkType,
    pub rel: Option<String>,
    pub is_nofollow: bool,
    pub is_ugc: bool,
    pub is_sponsored: bool,
}

// ============================================================================
// FINDING / REPORT ROW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Error" => Ok(Severity::Error),
            "Warning" => Ok(Severity::Warning),
            "Info" => Ok(Severity::Info),
            other => Err(anyhow::anyhow!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub project_id: i64,
    pub url_id: i64,
    pub task_key: String,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub project_id: i64,
    pub task_key: String,
    pub url_id: Option<i64>,
    pub data_map: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
