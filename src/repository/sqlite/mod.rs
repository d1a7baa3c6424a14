pub mod frontier_repository;
pub mod link_repository;
pub mod project_repository;
pub mod report_repository;
pub mod url_repository;

use crate::domain::models::{HreflangSource, LinkType, QueueState, RobotsSource, Severity, UrlStatus};
use std::str::FromStr;

pub(crate) fn map_queue_state(raw: &str) -> QueueState {
    QueueState::from_str(raw).unwrap_or(QueueState::Queued)
}

pub(crate) fn map_url_status(raw: &str) -> UrlStatus {
    UrlStatus::from_str(raw).unwrap_or(UrlStatus::Pending)
}

pub(crate) fn map_robots_source(raw: &str) -> RobotsSource {
    RobotsSource::from_str(raw).unwrap_or(RobotsSource::None)
}

pub(crate) fn map_link_type(raw: &str) -> LinkType {
    LinkType::from_str(raw).unwrap_or(LinkType::Hyperlink)
}

pub(crate) fn map_severity(raw: &str) -> Severity {
    Severity::from_str(raw).unwrap_or(Severity::Info)
}

pub(crate) fn map_hreflang_source(raw: &str) -> HreflangSource {
    HreflangSource::from_str(raw).unwrap_or(HreflangSource::Html)
}
