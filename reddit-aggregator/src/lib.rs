pub mod types;
pub mod config;
pub mod persistence;
pub mod fetcher;
pub mod medialink;
pub mod registry;
pub mod harvester;
pub mod ranking;
pub mod service;

pub use types::*;
pub use config::Config;
pub use persistence::Persistence;
pub use fetcher::RedditListingClient;
pub use medialink::MediaLinkResolver;
pub use registry::FeedRegistry;
pub use harvester::Harvester;
pub use ranking::{RankingEngine, ITEMS_PER_PAGE};
pub use service::HarvestService;
