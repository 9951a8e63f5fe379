pub mod cache;
pub mod filters;

use crate::persistence::Persistence;
use crate::registry::FeedRegistry;
use crate::types::{
    AggregatorError, AnnotatedPost, Feed, MediaKind, MediaResolver, RankedPage, Result,
};
use cache::RankedFeedCache;
use chrono::{Local, TimeZone, Utc};
use filters::{
    day_boundary, decorate_post_age, filter_by_max_daily_posts, filter_out_missing_media,
    sort_posts_into_display_order, ONE_DAY_SECS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Posts stored longer ago than this are never ranked.
pub const LOOKBACK_SECS: i64 = 7 * ONE_DAY_SECS;
pub const ITEMS_PER_PAGE: usize = 50;
pub const MAX_PAGE: usize = 5000;

/// Turns the stored corpus into each feed's display list: percentile
/// thresholds, day buckets, media filtering, per-day caps, display order.
/// Results are cached per feed.
pub struct RankingEngine<Tz: TimeZone = Local> {
    persistence: Arc<Persistence>,
    registry: Arc<FeedRegistry>,
    resolver: Arc<dyn MediaResolver>,
    cache: RankedFeedCache,
    tz: Tz,
    recomputations: AtomicU64,
}

impl RankingEngine<Local> {
    pub fn new(
        persistence: Arc<Persistence>,
        registry: Arc<FeedRegistry>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Self {
        Self {
            persistence,
            registry,
            resolver,
            cache: RankedFeedCache::new(),
            tz: Local,
            recomputations: AtomicU64::new(0),
        }
    }
}

impl<Tz: TimeZone> RankingEngine<Tz> {
    /// Day buckets roll over at 03:00 in `tz` instead of the local zone.
    pub fn with_timezone<T: TimeZone>(self, tz: T) -> RankingEngine<T> {
        RankingEngine {
            persistence: self.persistence,
            registry: self.registry,
            resolver: self.resolver,
            cache: self.cache,
            tz,
            recomputations: self.recomputations,
        }
    }

    /// How many times a feed's ranking has been computed from storage.
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }

    pub async fn get_ranked_posts(&self, feed_name: &str) -> Result<Arc<Vec<AnnotatedPost>>> {
        self.get_ranked_posts_at(feed_name, Utc::now().timestamp()).await
    }

    pub async fn get_ranked_posts_at(
        &self,
        feed_name: &str,
        now: i64,
    ) -> Result<Arc<Vec<AnnotatedPost>>> {
        let feed = self.registry.get_feed(feed_name)?;
        self.cache
            .get_or_compute(feed_name, now, || async {
                self.recomputations.fetch_add(1, Ordering::Relaxed);
                let posts = self.rank_feed(feed, now).await?;
                info!("Ranked feed '{}': {} posts", feed_name, posts.len());
                Ok(posts)
            })
            .await
    }

    pub async fn get_ranked_page(&self, feed_name: &str, page: usize) -> Result<RankedPage> {
        self.get_ranked_page_at(feed_name, page, Utc::now().timestamp())
            .await
    }

    /// 0-based page of the ranked feed. Pages past the end are empty.
    pub async fn get_ranked_page_at(
        &self,
        feed_name: &str,
        page: usize,
        now: i64,
    ) -> Result<RankedPage> {
        if page > MAX_PAGE {
            return Err(AggregatorError::InvalidPage { page });
        }
        let posts = self.get_ranked_posts_at(feed_name, now).await?;
        let total = posts.len();
        let page_count = total.div_ceil(ITEMS_PER_PAGE);
        let posts = posts
            .iter()
            .skip(page * ITEMS_PER_PAGE)
            .take(ITEMS_PER_PAGE)
            .cloned()
            .collect();

        Ok(RankedPage {
            feed: feed_name.to_string(),
            page,
            page_count,
            total,
            posts,
        })
    }

    /// The full uncached pipeline for one feed as of `now`.
    pub async fn rank_feed(&self, feed: &Feed, now: i64) -> Result<Vec<AnnotatedPost>> {
        let min_time = now - LOOKBACK_SECS;
        let mut posts = self.get_posts_filtered_by_percentile(min_time, feed).await?;

        decorate_post_age(day_boundary(now, &self.tz), &mut posts);
        self.decorate_posts_with_media_links(&mut posts);

        if feed.media == MediaKind::Image {
            posts = filter_out_missing_media(posts);
        }

        let mut posts = filter_by_max_daily_posts(posts, feed);
        sort_posts_into_display_order(&mut posts);
        Ok(posts)
    }

    // Subreddits with a percentile of 0 have no threshold and are left out.
    async fn get_posts_filtered_by_percentile(
        &self,
        min_time: i64,
        feed: &Feed,
    ) -> Result<Vec<AnnotatedPost>> {
        let mut min_scores = HashMap::new();
        for subreddit in feed.subreddits.iter().filter(|s| s.percentile > 0.0) {
            let score = self
                .persistence
                .get_score_at_percentile(min_time, &subreddit.name, subreddit.percentile)
                .await?;
            debug!(
                "Feed '{}': '{}' threshold at percentile {} is {}",
                feed.name, subreddit.name, subreddit.percentile, score
            );
            min_scores.insert(subreddit.name.clone(), score);
        }
        if min_scores.is_empty() {
            return Ok(Vec::new());
        }

        let posts = self
            .persistence
            .get_posts_for_subreddit_scores(min_time, &min_scores)
            .await?;
        Ok(posts.into_iter().map(AnnotatedPost::from).collect())
    }

    fn decorate_posts_with_media_links(&self, posts: &mut [AnnotatedPost]) {
        for post in posts.iter_mut() {
            let Some(url) = post.post.url.as_deref().filter(|u| !u.is_empty()) else {
                continue;
            };
            post.media_link = match self.resolver.resolve(url) {
                Ok(link) => link,
                Err(e) => {
                    warn!("Could not resolve media for post {}: {}", post.post.id, e);
                    None
                }
            };
        }
    }
}
