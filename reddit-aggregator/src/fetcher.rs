use crate::types::{AggregatorError, FetchConfig, ListingSource, RawPost, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Reads subreddit "new" listings from the public JSON endpoint.
pub struct RedditListingClient {
    client: Client,
    config: FetchConfig,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: ListingPost,
}

#[derive(Debug, Deserialize)]
struct ListingPost {
    id: String,
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    removed_by_category: Option<String>,
    #[serde(default)]
    stickied: bool,
    subreddit: String,
    subreddit_id: String,
}

impl From<ListingPost> for RawPost {
    fn from(post: ListingPost) -> Self {
        let is_deleted = post.removed_by_category.is_some()
            || post.author.as_deref() == Some("[deleted]");
        RawPost {
            id: post.id,
            name: post.name,
            title: post.title,
            url: post.url.unwrap_or_default(),
            permalink: post.permalink,
            score: post.score,
            time_created: post.created_utc as i64,
            is_deleted,
            is_sticky: post.stickied,
            subreddit_name: post.subreddit,
            subreddit_id: post.subreddit_id,
        }
    }
}

impl RedditListingClient {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn listing_url(&self, subreddit: &str, cursor: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)?.join(&format!("r/{}/new.json", subreddit))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.config.page_limit.to_string());
            query.append_pair("raw_json", "1");
            if let Some(after) = cursor.filter(|c| !c.is_empty()) {
                query.append_pair("after", after);
            }
        }
        Ok(url)
    }

    pub async fn fetch_listing(&self, subreddit: &str, cursor: Option<&str>) -> Result<Vec<RawPost>> {
        let url = self.listing_url(subreddit, cursor)?;
        let start_time = Instant::now();

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 16),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.timeout_seconds * 4)),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.fetch_once(subreddit, &url).await {
                Ok(posts) => {
                    debug!(
                        "Fetched {} posts from {} in {}ms",
                        posts.len(),
                        url,
                        start_time.elapsed().as_millis()
                    );
                    return Ok(posts);
                }
                Err(e) if attempt < self.config.max_retries && is_transient(&e) => {
                    attempt += 1;
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("Attempt {} failed for {}: {}, retrying in {:?}", attempt, url, e, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, subreddit: &str, url: &Url) -> Result<Vec<RawPost>> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                AggregatorError::Timeout {
                    source_name: subreddit.to_string(),
                }
            } else {
                AggregatorError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::HttpStatus {
                source_name: subreddit.to_string(),
                status,
            });
        }

        let body = response.text().await?;
        parse_listing(&body)
    }
}

/// Maps a `/new.json` listing body to posts, in listing order.
pub fn parse_listing(body: &str) -> Result<Vec<RawPost>> {
    let listing: Listing = serde_json::from_str(body)?;
    Ok(listing
        .data
        .children
        .into_iter()
        .map(|child| RawPost::from(child.data))
        .collect())
}

pub fn is_transient(error: &AggregatorError) -> bool {
    match error {
        AggregatorError::Timeout { .. } => true,
        AggregatorError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
        AggregatorError::HttpStatus { status, .. } => {
            status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
        }
        _ => false,
    }
}

#[async_trait]
impl ListingSource for RedditListingClient {
    async fn fetch_page(&self, source: &str, cursor: Option<&str>) -> anyhow::Result<Vec<RawPost>> {
        Ok(self.fetch_listing(source, cursor).await?)
    }
}
