pub mod sqlite;

pub use sqlite::frontier_repository::FrontierRepository;
pub use sqlite::link_repository::LinkRepository;
pub use sqlite::project_repository::ProjectRepository;
pub use sqlite::report_repository::ReportRepository;
pub use sqlite::url_repository::UrlRepository;
