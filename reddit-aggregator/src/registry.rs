use crate::types::{AggregatorError, Feed, FeedSummary, HarvestStatus, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default)]
struct SourceState {
    status: HarvestStatus,
    time_last_harvested: i64,
}

/// Feed name -> feed configuration, plus the harvest state of every source.
/// The feed definitions are fixed at construction; only source states change.
pub struct FeedRegistry {
    feeds: HashMap<String, Feed>,
    sources: RwLock<HashMap<String, SourceState>>,
}

impl FeedRegistry {
    pub fn new(feeds: Vec<Feed>) -> Self {
        Self {
            feeds: feeds.into_iter().map(|feed| (feed.name.clone(), feed)).collect(),
            sources: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_feed(&self, name: &str) -> Result<&Feed> {
        self.feeds.get(name).ok_or_else(|| AggregatorError::FeedNotFound {
            name: name.to_string(),
        })
    }

    pub async fn source_status(&self, source: &str) -> HarvestStatus {
        self.sources
            .read()
            .await
            .get(source)
            .map(|state| state.status)
            .unwrap_or_default()
    }

    /// Restores last clean completion times saved by a previous process.
    pub async fn restore_last_runs(&self, last_runs: &HashMap<String, i64>) {
        let mut sources = self.sources.write().await;
        for (source, last_run) in last_runs {
            sources.entry(source.clone()).or_default().time_last_harvested = *last_run;
        }
    }

    pub async fn mark_harvesting(&self, source: &str) {
        let mut sources = self.sources.write().await;
        sources.entry(source.to_string()).or_default().status = HarvestStatus::Harvesting;
    }

    pub async fn mark_idle(&self, source: &str, now: i64) {
        let mut sources = self.sources.write().await;
        let state = sources.entry(source.to_string()).or_default();
        state.status = HarvestStatus::Idle;
        state.time_last_harvested = now;
    }

    /// Idle again after a harvest cut short; the last completion time stays.
    pub async fn mark_interrupted(&self, source: &str) {
        let mut sources = self.sources.write().await;
        sources.entry(source.to_string()).or_default().status = HarvestStatus::Idle;
    }

    pub async fn mark_error(&self, source: &str) {
        let mut sources = self.sources.write().await;
        sources.entry(source.to_string()).or_default().status = HarvestStatus::Error;
    }

    /// A feed is harvesting while any of its sources is, errored if any
    /// source errored, else idle. It was last harvested when its least
    /// recently harvested source was.
    pub async fn list_feeds(&self) -> Vec<FeedSummary> {
        let sources = self.sources.read().await;
        let mut summaries: Vec<FeedSummary> = self
            .feeds
            .values()
            .map(|feed| {
                let states: Vec<SourceState> = feed
                    .subreddits
                    .iter()
                    .map(|s| sources.get(&s.name).copied().unwrap_or_default())
                    .collect();
                let status = if states.iter().any(|s| s.status == HarvestStatus::Harvesting) {
                    HarvestStatus::Harvesting
                } else if states.iter().any(|s| s.status == HarvestStatus::Error) {
                    HarvestStatus::Error
                } else {
                    HarvestStatus::Idle
                };
                FeedSummary {
                    name: feed.name.clone(),
                    description: feed.description.clone(),
                    status,
                    time_last_harvested: states
                        .iter()
                        .map(|s| s.time_last_harvested)
                        .min()
                        .unwrap_or(0),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}
