use crate::types::{AggregatorError, Feed, FetchConfig, HarvestConfig, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "contentscraper.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_harvest_interval_minutes")]
    pub harvest_interval_minutes: u64,
    #[serde(default)]
    pub reddit: RedditSection,
    #[serde(default)]
    pub harvest: HarvestSection,
    #[serde(default)]
    pub feeds: Vec<Feed>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditSection {
    pub user_agent: Option<String>,
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarvestSection {
    pub max_pages_to_scrape: Option<usize>,
    pub min_posts_per_scrape: Option<usize>,
    pub min_new_post_percent: Option<f64>,
    pub page_timeout_seconds: Option<u64>,
}

fn default_database_path() -> String {
    "contentscraper.db".to_string()
}

fn default_harvest_interval_minutes() -> u64 {
    6 * 60
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(
            "Loaded configuration from {} ({} feeds)",
            path.display(),
            config.feeds.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects anything the harvester or ranking engine could not act on.
    pub fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            return Err(AggregatorError::Config("no feeds configured".to_string()));
        }
        if self.harvest_interval_minutes == 0 {
            return Err(AggregatorError::Config(
                "harvest_interval_minutes must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(AggregatorError::Config("feed with an empty name".to_string()));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(AggregatorError::Config(format!(
                    "duplicate feed name '{}'",
                    feed.name
                )));
            }
            if feed.subreddits.is_empty() {
                return Err(AggregatorError::Config(format!(
                    "feed '{}' has no subreddits",
                    feed.name
                )));
            }
            for source in &feed.subreddits {
                if source.name.trim().is_empty() {
                    return Err(AggregatorError::Config(format!(
                        "feed '{}' has a subreddit with an empty name",
                        feed.name
                    )));
                }
                if !source.percentile.is_finite() || source.percentile < 0.0 {
                    return Err(AggregatorError::Config(format!(
                        "feed '{}': invalid percentile {} for '{}'",
                        feed.name, source.percentile, source.name
                    )));
                }
            }
        }

        if let Some(percent) = self.harvest.min_new_post_percent {
            if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
                return Err(AggregatorError::Config(format!(
                    "min_new_post_percent must be within 0..=100, got {}",
                    percent
                )));
            }
        }
        Ok(())
    }

    /// Every subreddit named by any feed, once, in first-seen order.
    pub fn harvest_sources(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.feeds
            .iter()
            .flat_map(|feed| feed.subreddits.iter())
            .filter(|source| seen.insert(source.name.clone()))
            .map(|source| source.name.clone())
            .collect()
    }

    pub fn harvest_interval(&self) -> Duration {
        Duration::from_secs(self.harvest_interval_minutes * 60)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let defaults = FetchConfig::default();
        FetchConfig {
            user_agent: self.reddit.user_agent.clone().unwrap_or(defaults.user_agent),
            base_url: self.reddit.base_url.clone().unwrap_or(defaults.base_url),
            timeout_seconds: self.reddit.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            max_retries: self.reddit.max_retries.unwrap_or(defaults.max_retries),
            ..defaults
        }
    }

    pub fn harvest_config(&self) -> HarvestConfig {
        let defaults = HarvestConfig::default();
        HarvestConfig {
            max_pages_to_scrape: self
                .harvest
                .max_pages_to_scrape
                .unwrap_or(defaults.max_pages_to_scrape),
            min_posts_per_scrape: self
                .harvest
                .min_posts_per_scrape
                .unwrap_or(defaults.min_posts_per_scrape),
            min_new_post_percent: self
                .harvest
                .min_new_post_percent
                .unwrap_or(defaults.min_new_post_percent),
            page_timeout: self
                .harvest
                .page_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.page_timeout),
        }
    }
}
