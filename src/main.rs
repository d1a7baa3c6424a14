use clap::{Parser, Subcommand};
use sitewalker::db;
use sitewalker::domain::models::{Project, ProjectSettings, ProxyConfig, UserAgentSetting};
use sitewalker::error::Result;
use sitewalker::frontier::Frontier;
use sitewalker::plugin::PluginRegistry;
use sitewalker::repository::{FrontierRepository, LinkRepository, ProjectRepository, ReportRepository, UrlRepository};
use sitewalker::robots::RobotsCache;
use sitewalker::worker::Controller;
use sitewalker::browser::BrowserPool;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a site starting from a base URL, persisting results to a SQLite database.
    Crawl {
        #[clap(long)]
        url: String,

        #[clap(long)]
        db: PathBuf,

        #[clap(long, default_value_t = 4)]
        concurrency: u32,

        #[clap(long, default_value_t = 5)]
        max_depth: i32,

        #[clap(long, default_value_t = 500)]
        max_urls: u32,

        #[clap(long, default_value_t = 0.5)]
        delay_seconds: f64,

        #[clap(long, default_value_t = 30)]
        timeout_seconds: u32,

        #[clap(long, default_value_t = true)]
        respect_robots: bool,

        #[clap(long, default_value_t = true)]
        use_sitemap: bool,

        #[clap(long)]
        user_agent: Option<String>,

        #[clap(long)]
        proxy_server: Option<String>,

        #[clap(long, default_value_t = true)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    sitewalker::lifecycle::init_logging();
    let args = Args::parse();

    match args.command {
        Commands::Crawl {
            url,
            db: db_path,
            concurrency,
            max_depth,
            max_urls,
            delay_seconds,
            timeout_seconds,
            respect_robots,
            use_sitemap,
            user_agent,
            proxy_server,
            headless,
        } => {
            let pool = db::init_db(&db_path).await?;

            let settings = ProjectSettings {
                base_url: url.clone(),
                concurrent_requests: concurrency,
                max_crawl_depth: max_depth,
                max_urls_to_crawl: max_urls,
                crawl_delay_seconds: delay_seconds,
                timeout_seconds,
                respect_robots_txt: respect_robots,
                use_sitemap_xml: use_sitemap,
                user_agent: user_agent
                    .map(UserAgentSetting::Literal)
                    .unwrap_or(UserAgentSetting::Preset(sitewalker::domain::models::UserAgentPreset::Desktop)),
                proxy: proxy_server.map(|server| ProxyConfig {
                    enabled: true,
                    server,
                    username: None,
                    password: None,
                    bypass_list: Vec::new(),
                }),
            };

            let project_repo = ProjectRepository::new(pool.clone());
            let project = match project_repo.find_by_base_url(&url).await? {
                Some(existing) => {
                    info!(project_id = existing.id, "resuming existing project");
                    existing
                }
                None => {
                    let id = project_repo.create(&url, &settings).await?;
                    Project {
                        id,
                        name: url.clone(),
                        settings,
                        created_at: chrono::Utc::now(),
                    }
                }
            };

            let frontier_repo = FrontierRepository::new(pool.clone());
            let frontier = Frontier::new(frontier_repo, project.id).await?;
            let browser = BrowserPool::new(headless, project.settings.proxy.clone());
            let robots = RobotsCache::new();
            let url_repo = UrlRepository::new(pool.clone());
            let link_repo = LinkRepository::new(pool.clone());
            let report_repo = ReportRepository::new(pool.clone());
            let plugins = PluginRegistry::new();

            let controller = Controller::new();
            controller
                .start(project, frontier, browser, robots, url_repo, link_repo, report_repo, plugins)
                .await?;

            info!("crawl finished");
            Ok(())
        }
    }
}
