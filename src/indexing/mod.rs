//! Building and maintaining the index: root discovery, the full crawl,
//! the mutation applier fed by the watcher, and the facade tying them
//! together.

pub mod applier;
pub mod crawler;
pub mod facade;
pub mod filter;
pub mod roots;

pub use applier::{ApplyStats, MutationApplier};
pub use crawler::{CrawlStats, Crawler};
pub use facade::IndexFacade;
pub use filter::EntryFilter;
pub use roots::{
    FixedRoots, RootSource, VolumeClass, VolumeRoots, classify_volume, root_source_for,
};
