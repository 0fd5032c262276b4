//! Knowledge Planet (zsxq) group archiver.
//!
//! Turns a group id plus session credentials into a deduplicated, paginated
//! sequence of normalized posts, using the JSON API when possible and the
//! rendered web view when not, then stores them as JSON/CSV with images.

pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod scrapers;
pub mod services;
pub mod storage;

pub use error::{CrawlError, Result};
