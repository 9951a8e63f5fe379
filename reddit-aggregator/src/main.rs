use clap::{Parser, Subcommand};
use reddit_aggregator::config::DEFAULT_CONFIG_FILE;
use reddit_aggregator::{
    Config, FeedRegistry, HarvestService, Harvester, MediaLinkResolver, Persistence,
    RankingEngine, RedditListingClient,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Harvests subreddit listings and serves ranked feeds of their best posts.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Harvest on a schedule until interrupted with Ctrl-C
    Run {
        /// Do not harvest, just keep the database open
        #[arg(long)]
        no_harvest: bool,
    },
    /// Run a single harvest pass and exit
    Harvest,
    /// List configured feeds and their harvest status
    Feeds,
    /// Print one page of a ranked feed as JSON
    Show {
        feed: String,
        #[arg(long, default_value_t = 0)]
        page: usize,
    },
}

struct App {
    config: Config,
    persistence: Arc<Persistence>,
    registry: Arc<FeedRegistry>,
}

impl App {
    async fn load(path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(path)?;
        let persistence = Arc::new(Persistence::open(&config.database_path).await?);
        let registry = Arc::new(FeedRegistry::new(config.feeds.clone()));
        registry
            .restore_last_runs(&persistence.get_last_runs().await?)
            .await;
        Ok(Self {
            config,
            persistence,
            registry,
        })
    }

    fn harvester(&self) -> anyhow::Result<Harvester> {
        let listing = Arc::new(RedditListingClient::new(self.config.fetch_config())?);
        let mut harvester = Harvester::new(
            listing,
            self.persistence.clone(),
            self.registry.clone(),
            self.config.harvest_config(),
        );
        for source in self.config.harvest_sources() {
            harvester.add_source(source);
        }
        Ok(harvester)
    }
}

fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let app = App::load(&cli.config).await.map_err(|e| {
        error!("Failed to start with {}: {:#}", cli.config.display(), e);
        e
    })?;

    match cli.command {
        Command::Run { no_harvest } => {
            if no_harvest {
                info!("Harvesting disabled, waiting for Ctrl-C");
                tokio::signal::ctrl_c().await?;
                app.persistence.close().await;
                return Ok(());
            }
            let service = HarvestService::spawn(
                app.harvester()?,
                app.config.harvest_interval(),
                app.persistence.clone(),
            );
            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C received, shutting down");
            service.shutdown().await;
        }
        Command::Harvest => {
            let report = app.harvester()?.harvest().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            app.persistence.close().await;
            if !report.is_success() {
                anyhow::bail!("one or more sources failed to harvest");
            }
        }
        Command::Feeds => {
            let feeds = app.registry.list_feeds().await;
            println!("{}", serde_json::to_string_pretty(&feeds)?);
        }
        Command::Show { feed, page } => {
            let engine = RankingEngine::new(
                app.persistence.clone(),
                app.registry.clone(),
                Arc::new(MediaLinkResolver::new()),
            );
            let ranked = engine.get_ranked_page(&feed, page).await?;
            println!("{}", serde_json::to_string_pretty(&ranked)?);
            app.persistence.close().await;
        }
    }
    Ok(())
}
