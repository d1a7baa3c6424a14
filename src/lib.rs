pub mod browser;
pub mod db;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod frontier;
pub mod lifecycle;
pub mod plugin;
pub mod politeness;
pub mod repository;
pub mod robots;
pub mod sitemap;
pub mod url_filter;
pub mod worker;
