//! Service layer for crawl logic.
//!
//! Kept separate from the CLI so the same crawls can be driven from tests
//! or another front end.

pub mod crawler;
pub mod media;

pub use crawler::{CrawlEvent, CrawlOptions, CrawlReport, Crawler, RetrievalPath};
pub use media::MediaFetcher;
