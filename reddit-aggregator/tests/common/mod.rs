#![allow(dead_code)]

use async_trait::async_trait;
use reddit_aggregator::types::*;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn raw_post(subreddit: &str, id: &str, score: i64) -> RawPost {
    RawPost {
        id: id.to_string(),
        name: format!("t3_{}", id),
        title: format!("Post {}", id),
        url: format!("https://example.com/{}/{}", subreddit, id),
        permalink: format!("/r/{}/comments/{}/", subreddit, id),
        score,
        time_created: 1_500_000_000,
        is_deleted: false,
        is_sticky: false,
        subreddit_name: subreddit.to_string(),
        subreddit_id: format!("t5_{}", subreddit),
    }
}

/// `count` posts with ids `{prefix}0..{prefix}{count-1}`.
pub fn raw_page(subreddit: &str, prefix: &str, count: usize) -> Vec<RawPost> {
    (0..count)
        .map(|i| raw_post(subreddit, &format!("{}{}", prefix, i), i as i64))
        .collect()
}

pub fn stored_post(subreddit: &str, id: &str, score: i64, time_stored: i64) -> Post {
    let mut post = Post::from_raw(raw_post(subreddit, id, score), time_stored);
    post.time_created = time_stored;
    post
}

pub fn feed(name: &str, media: MediaKind, subreddits: &[(&str, f64, u32)]) -> Feed {
    Feed {
        name: name.to_string(),
        description: format!("{} feed", name),
        media,
        subreddits: subreddits
            .iter()
            .map(|(name, percentile, max_daily_posts)| SourceFilterConfig {
                name: name.to_string(),
                percentile: *percentile,
                max_daily_posts: *max_daily_posts,
            })
            .collect(),
    }
}

pub fn fast_harvest_config() -> HarvestConfig {
    HarvestConfig {
        page_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Replays queued pages per subreddit; an exhausted queue yields empty pages.
/// Every call is recorded with its cursor.
#[derive(Default)]
pub struct ScriptedListing {
    pages: Mutex<HashMap<String, VecDeque<std::result::Result<Vec<RawPost>, String>>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, subreddit: &str, page: Vec<RawPost>) {
        self.pages
            .lock()
            .unwrap()
            .entry(subreddit.to_string())
            .or_default()
            .push_back(Ok(page));
    }

    pub fn push_error(&self, subreddit: &str, message: &str) {
        self.pages
            .lock()
            .unwrap()
            .entry(subreddit.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for ScriptedListing {
    async fn fetch_page(&self, source: &str, cursor: Option<&str>) -> anyhow::Result<Vec<RawPost>> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_string(), cursor.map(str::to_string)));
        let next = self
            .pages
            .lock()
            .unwrap()
            .get_mut(source)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(Ok(page)) => Ok(page),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}

/// Every call returns a page of `page_size` posts never seen before.
pub struct EndlessListing {
    page_size: usize,
    calls: AtomicUsize,
}

impl EndlessListing {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for EndlessListing {
    async fn fetch_page(&self, source: &str, _cursor: Option<&str>) -> anyhow::Result<Vec<RawPost>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(raw_page(source, &format!("p{}_", call), self.page_size))
    }
}

/// Never answers within any reasonable page timeout.
pub struct StalledListing;

#[async_trait]
impl ListingSource for StalledListing {
    async fn fetch_page(&self, _source: &str, _cursor: Option<&str>) -> anyhow::Result<Vec<RawPost>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}
