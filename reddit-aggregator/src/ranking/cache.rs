use crate::types::{AnnotatedPost, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// How long a ranked feed is served before it is recomputed.
pub const CACHE_TTL_SECS: i64 = 6 * 60 * 60;

#[derive(Debug, Clone)]
struct CachedPosts {
    posts: Arc<Vec<AnnotatedPost>>,
    computed_at: i64,
}

type Slot = Arc<Mutex<Option<CachedPosts>>>;

/// Ranked posts per feed name, held for the life of the process.
///
/// Each feed has its own slot lock, held across a recomputation: concurrent
/// requests for the same stale feed wait for the one computation in flight
/// and then all see its result. Entries are only ever replaced whole.
#[derive(Default)]
pub struct RankedFeedCache {
    slots: RwLock<HashMap<String, Slot>>,
}

impl RankedFeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, feed_name: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(feed_name) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(feed_name.to_string())
            .or_default()
            .clone()
    }

    /// Returns the cached posts if they are at most `CACHE_TTL_SECS` old at
    /// `now`, otherwise runs `compute` and stores its result. A failed
    /// computation leaves the previous entry in place.
    pub async fn get_or_compute<F, Fut>(
        &self,
        feed_name: &str,
        now: i64,
        compute: F,
    ) -> Result<Arc<Vec<AnnotatedPost>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<AnnotatedPost>>>,
    {
        let slot = self.slot(feed_name).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if now - cached.computed_at <= CACHE_TTL_SECS {
                debug!("Serving cached posts for feed '{}'", feed_name);
                return Ok(cached.posts.clone());
            }
        }

        let posts = Arc::new(compute().await?);
        *entry = Some(CachedPosts {
            posts: posts.clone(),
            computed_at: now,
        });
        Ok(posts)
    }
}
