pub mod defs;

pub use defs::{HarvestStatus, ListingSource, MediaKind, MediaLink, MediaResolver, RawPost};
