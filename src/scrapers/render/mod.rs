//! Rendered-HTML retrieval.
//!
//! A [`Renderer`] turns one URL into the page's HTML; [`parse_posts`] pulls
//! the posts back out. Used when the JSON API is blocked or when the target
//! only exists as a web view.

mod parse;

pub use parse::{parse_posts, RenderSelectors};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::HttpClient;
use crate::error::{CrawlError, Result};

/// Which renderer a crawl uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// Scripted headless browser.
    #[default]
    Browser,
    /// Plain GET with the session headers; no script execution.
    Http,
}

/// Something that can load a URL and hand back the resulting HTML.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url` and return its HTML once the page has settled.
    async fn render(&self, url: &str, timeout: Duration) -> Result<String>;

    /// Release any resources held between renders.
    async fn close(&self) {}
}

/// Renderer that fetches the raw HTML over HTTP.
pub struct HttpRenderer {
    client: HttpClient,
}

impl HttpRenderer {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String> {
        info!("Fetching {} over HTTP", url);
        match tokio::time::timeout(timeout, self.client.get_text(url)).await {
            Ok(result) => result,
            Err(_) => Err(CrawlError::Render(format!(
                "timed out after {:?} loading {}",
                timeout, url
            ))),
        }
    }
}
