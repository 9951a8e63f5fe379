use crate::persistence::Persistence;
use crate::registry::FeedRegistry;
use crate::types::{
    AggregatorError, HarvestConfig, HarvestReport, ListingSource, Post, RawPost, Result,
    SourceHarvest, StoreResult,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Why a source's pagination loop ended early (or not at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageVerdict {
    Continue,
    MaxPages,
    ShortPage,
    MostlySeen,
}

enum SourceOutcome {
    Completed,
    Interrupted,
}

/// Walks each configured subreddit's listing page by page and stores what it
/// finds. Sources are drained one after another, never concurrently.
pub struct Harvester {
    listing: Arc<dyn ListingSource>,
    persistence: Arc<Persistence>,
    registry: Arc<FeedRegistry>,
    sources: Vec<String>,
    config: HarvestConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Harvester {
    pub fn new(
        listing: Arc<dyn ListingSource>,
        persistence: Arc<Persistence>,
        registry: Arc<FeedRegistry>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            listing,
            persistence,
            registry,
            sources: Vec::new(),
            config,
            shutdown: None,
        }
    }

    /// Pages already in flight complete; the loop stops before the next one.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn add_source(&mut self, subreddit: impl Into<String>) {
        let subreddit = subreddit.into();
        if !self.sources.contains(&subreddit) {
            self.sources.push(subreddit);
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// One pass over all sources. A failing source is recorded in the report
    /// and in the registry; the remaining sources are still harvested.
    pub async fn harvest(&self) -> HarvestReport {
        let mut report = HarvestReport::default();

        for source in &self.sources {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping harvest before '{}'", source);
                report.interrupted = true;
                break;
            }

            self.registry.mark_harvesting(source).await;
            let mut tally = SourceHarvest {
                source: source.clone(),
                ..Default::default()
            };

            match self.harvest_source(source, &mut tally).await {
                Ok(SourceOutcome::Completed) => self.complete_source(source, &mut tally).await,
                Ok(SourceOutcome::Interrupted) => {
                    tally.interrupted = true;
                    self.registry.mark_interrupted(source).await;
                    info!("Harvest of '{}' interrupted after {} pages", source, tally.pages);
                }
                Err(e) => self.fail_source(source, &mut tally, e).await,
            }
            report.sources.push(tally);
        }

        if self.shutdown_requested() {
            report.interrupted = true;
        }
        report
    }

    // Only a clean completion moves the source's last-run time forward.
    async fn complete_source(&self, source: &str, tally: &mut SourceHarvest) {
        let now = Utc::now().timestamp();
        if let Err(e) = self.persistence.upsert_last_run(source, now).await {
            self.fail_source(source, tally, e).await;
            return;
        }
        self.registry.mark_idle(source, now).await;
        info!(
            "Harvested '{}': {} pages, {} new, {} updated, {} skipped",
            source, tally.pages, tally.new_posts, tally.updated_posts, tally.skipped_posts
        );
    }

    async fn fail_source(&self, source: &str, tally: &mut SourceHarvest, e: AggregatorError) {
        self.registry.mark_error(source).await;
        error!("Harvest of '{}' aborted: {}", source, e);
        tally.error = Some(e.to_string());
    }

    async fn harvest_source(&self, source: &str, tally: &mut SourceHarvest) -> Result<SourceOutcome> {
        let mut cursor: Option<String> = None;

        loop {
            if self.shutdown_requested() {
                info!("Shutdown requested, leaving '{}' after {} pages", source, tally.pages);
                return Ok(SourceOutcome::Interrupted);
            }

            let page = self.fetch_page(source, cursor.as_deref()).await?;
            tally.pages += 1;
            let page_size = page.len();
            let now = Utc::now().timestamp();

            let mut num_posts = 0;
            let mut num_new_posts = 0;
            let mut last_name: Option<String> = None;
            for raw in page.into_iter().filter(|p| !p.is_sticky) {
                last_name = Some(raw.name.clone());
                let post = Post::from_raw(raw, now);
                match self.persistence.store_post(&post).await? {
                    StoreResult::New => {
                        num_new_posts += 1;
                        tally.new_posts += 1;
                    }
                    StoreResult::Updated => tally.updated_posts += 1,
                    StoreResult::Skipped => tally.skipped_posts += 1,
                }
                num_posts += 1;
            }

            let verdict = self.next_page_verdict(tally.pages, page_size, num_posts, num_new_posts);
            debug!(
                "'{}' page {}: {} posts, {} kept, {} new -> {:?}",
                source, tally.pages, page_size, num_posts, num_new_posts, verdict
            );
            if verdict != PageVerdict::Continue {
                return Ok(SourceOutcome::Completed);
            }

            match last_name {
                Some(name) => cursor = Some(name),
                None => return Ok(SourceOutcome::Completed),
            }
        }
    }

    async fn fetch_page(&self, source: &str, cursor: Option<&str>) -> Result<Vec<RawPost>> {
        let fetch = self.listing.fetch_page(source, cursor);
        match tokio::time::timeout(self.config.page_timeout, fetch).await {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(e)) => Err(AggregatorError::Fetch {
                source_name: source.to_string(),
                message: format!("{:#}", e),
            }),
            Err(_) => {
                warn!("Page fetch for '{}' exceeded {:?}", source, self.config.page_timeout);
                Err(AggregatorError::Timeout {
                    source_name: source.to_string(),
                })
            }
        }
    }

    fn next_page_verdict(
        &self,
        pages_fetched: usize,
        page_size: usize,
        num_posts: usize,
        num_new_posts: usize,
    ) -> PageVerdict {
        if pages_fetched >= self.config.max_pages_to_scrape {
            return PageVerdict::MaxPages;
        }
        if page_size < self.config.min_posts_per_scrape {
            return PageVerdict::ShortPage;
        }
        // A page of nothing but sticky posts counts as nothing new.
        if num_posts == 0
            || (100 * num_new_posts) as f64 / (num_posts as f64) < self.config.min_new_post_percent
        {
            return PageVerdict::MostlySeen;
        }
        PageVerdict::Continue
    }
}
