//! Error types for the crawl engine.
//!
//! Mirrors the `§7 ERROR HANDLING DESIGN` error kinds. Most of these are
//! valid *outcomes* rather than hard failures — see the policy notes on
//! each variant and `src/worker/pool.rs` for how they're handled.

use thiserror::Error;

/// Domain error kinds for the crawl engine.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("http error: {0}")]
    HttpError(i32),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("robots fetch error: {0}")]
    RobotsFetchError(String),

    #[error("sitemap parse error: {0}")]
    SitemapParseError(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("plugin error in {task_key}: {message}")]
    PluginError { task_key: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CrawlError>;

impl From<sqlx::Error> for CrawlError {
    fn from(e: sqlx::Error) -> Self {
        CrawlError::PersistenceError(e.to_string())
    }
}
