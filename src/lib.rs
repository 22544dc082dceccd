//! twtxt-cache - feed fetch-and-cache engine
//!
//! This crate fetches plain-text twtxt feeds from many sources in parallel,
//! revalidates them with conditional requests, parses them into tweets and
//! keeps the result in a cache that can be snapshotted to disk.

pub mod cache;
pub mod config;
pub mod error;
pub mod feeds;
pub mod fetcher;
pub mod parser;
pub mod time;
pub mod tweets;
pub mod version;

pub use cache::{Cache, Cached};
pub use error::{CacheError, Result};
pub use fetcher::{Fetcher, FetcherOptions, RefreshSummary};
pub use tweets::{Tweet, Tweeter, Tweets};
