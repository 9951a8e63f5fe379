use serde::{Deserialize, Serialize};
use std::time::Duration;
pub use interfaces::defs::{HarvestStatus, ListingSource, MediaKind, MediaLink, MediaResolver, RawPost};

/// A stored post. Identity is `(id, subreddit_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub name: String,
    pub permalink: String,
    pub time_created: i64,
    pub time_stored: i64,
    pub is_active: bool,
    pub is_sticky: bool,
    pub score: i64,
    pub title: String,
    pub url: Option<String>,
    pub subreddit_name: String,
    pub subreddit_id: String,
}

impl Post {
    /// Builds the row for a freshly harvested post. `time_stored` only
    /// sticks on first insert; updates never rewrite it.
    pub fn from_raw(raw: RawPost, time_stored: i64) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            permalink: raw.permalink,
            time_created: raw.time_created,
            time_stored,
            is_active: !raw.is_deleted,
            is_sticky: raw.is_sticky,
            score: raw.score,
            title: raw.title,
            url: Some(raw.url).filter(|u| !u.is_empty()),
            subreddit_name: raw.subreddit_name,
            subreddit_id: raw.subreddit_id,
        }
    }
}

/// Outcome of `Persistence::store_post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreResult {
    New,
    Updated,
    /// Not written: another post already links to the same url.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedPost {
    #[serde(flatten)]
    pub post: Post,
    pub age_in_days: i64,
    pub media_link: Option<MediaLink>,
}

impl From<Post> for AnnotatedPost {
    fn from(post: Post) -> Self {
        Self {
            post,
            age_in_days: 0,
            media_link: None,
        }
    }
}

/// One page of a ranked feed, as handed to the rendering layer.
#[derive(Debug, Clone, Serialize)]
pub struct RankedPage {
    pub feed: String,
    pub page: usize,
    pub page_count: usize,
    pub total: usize,
    pub posts: Vec<AnnotatedPost>,
}

/// Per-source ranking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFilterConfig {
    pub name: String,
    /// Keep posts scoring at or above the score at this percentile rank.
    /// `0` removes the source from the ranked output.
    #[serde(default)]
    pub percentile: f64,
    #[serde(default)]
    pub max_daily_posts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub media: MediaKind,
    pub subreddits: Vec<SourceFilterConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedSummary {
    pub name: String,
    pub description: String,
    pub status: HarvestStatus,
    // Epoch seconds, 0 means never.
    pub time_last_harvested: i64,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub page_limit: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "linux:reddit-aggregator:0.1.0".to_string(),
            base_url: "https://www.reddit.com".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 2,
            page_limit: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub max_pages_to_scrape: usize,
    pub min_posts_per_scrape: usize,
    pub min_new_post_percent: f64,
    /// Upper bound on a single page fetch, on top of the client's own timeout.
    pub page_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_pages_to_scrape: 10,
            min_posts_per_scrape: 10,
            min_new_post_percent: 20.0,
            page_timeout: Duration::from_secs(120),
        }
    }
}

/// Per-source tallies from one harvest pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceHarvest {
    pub source: String,
    pub pages: usize,
    pub new_posts: usize,
    pub updated_posts: usize,
    pub skipped_posts: usize,
    /// Stopped by shutdown before the pagination loop finished.
    pub interrupted: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub sources: Vec<SourceHarvest>,
    pub interrupted: bool,
}

impl HarvestReport {
    pub fn is_success(&self) -> bool {
        self.sources.iter().all(|s| s.error.is_none())
    }

    pub fn new_posts(&self) -> usize {
        self.sources.iter().map(|s| s.new_posts).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to fetch listing for subreddit '{source_name}': {message}")]
    Fetch { source_name: String, message: String },

    #[error("Listing for subreddit '{source_name}' returned HTTP {status}")]
    HttpStatus {
        source_name: String,
        status: reqwest::StatusCode,
    },

    #[error("Fetching a page of '{source_name}' timed out")]
    Timeout { source_name: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Could not parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unknown feed name: {name}")]
    FeedNotFound { name: String },

    #[error("Invalid page number: {page}")]
    InvalidPage { page: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
