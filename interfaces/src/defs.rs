use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A post exactly as the origin returned it in a listing page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawPost {
    pub id: String,
    // Pagination token ("after" value), distinct from `id`.
    pub name: String,
    pub title: String,
    pub url: String,
    pub permalink: String,
    pub score: i64,
    pub time_created: i64,
    pub is_deleted: bool,
    pub is_sticky: bool,
    pub subreddit_name: String,
    pub subreddit_id: String,
}

/// How a feed's posts are displayed. Image feeds only show posts whose
/// link resolves to something embeddable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Text,
    Image,
}

/// Either a direct link to an image/video, or an HTML fragment that embeds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MediaLink {
    Direct(String),
    Embed(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestStatus {
    #[default]
    Idle,
    Harvesting,
    Error,
}

/// One page of a source's listing per call. `cursor` is the `name` of the
/// last post of the previous page, or `None` for the first page.
///
/// Shared behind an `Arc<dyn ListingSource>`, so implementations must not
/// keep per-call state.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_page(&self, source: &str, cursor: Option<&str>) -> Result<Vec<RawPost>>;
}

/// Turns an external link into something displayable. `Ok(None)` means the
/// link was understood but there is nothing to embed. Shared the same way
/// as [`ListingSource`].
pub trait MediaResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Result<Option<MediaLink>>;
}

