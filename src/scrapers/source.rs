//! Page sources driven by the paginator.
//!
//! The API and the rendered web view are two implementations of the same
//! capability: given a cursor, return one page of normalized records.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::api::ApiClient;
use super::render::{parse_posts, RenderSelectors, Renderer};
use crate::error::Result;
use crate::models::{Comment, Keyed, Post};
use crate::normalize;

/// One page of normalized records.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when the source has nothing after this page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    /// A page with nothing after it.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

/// A cursor-paged sequence of records.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Keyed + Send;

    /// Human-readable name used in logs and retry messages.
    fn describe(&self) -> String;

    /// Fetch the page starting at `cursor`; `count` is a size hint.
    async fn fetch_page(&self, cursor: Option<&str>, count: usize) -> Result<Page<Self::Item>>;
}

/// Topics of a group through the JSON API.
pub struct TopicPages {
    api: ApiClient,
    group_id: String,
}

impl TopicPages {
    pub fn new(api: ApiClient, group_id: impl Into<String>) -> Self {
        Self {
            api,
            group_id: group_id.into(),
        }
    }
}

#[async_trait]
impl PageSource for TopicPages {
    type Item = Post;

    fn describe(&self) -> String {
        format!("topics of group {}", self.group_id)
    }

    async fn fetch_page(&self, cursor: Option<&str>, count: usize) -> Result<Page<Post>> {
        let (topics, next) = self.api.get_topics(&self.group_id, cursor, count).await?;
        Ok(Page::new(topics.iter().map(normalize::topic).collect(), next))
    }
}

/// Comments on one topic through the JSON API.
pub struct CommentPages {
    api: ApiClient,
    topic_id: String,
}

impl CommentPages {
    pub fn new(api: ApiClient, topic_id: impl Into<String>) -> Self {
        Self {
            api,
            topic_id: topic_id.into(),
        }
    }
}

#[async_trait]
impl PageSource for CommentPages {
    type Item = Comment;

    fn describe(&self) -> String {
        format!("comments of topic {}", self.topic_id)
    }

    async fn fetch_page(&self, cursor: Option<&str>, _count: usize) -> Result<Page<Comment>> {
        let (comments, next) = self.api.get_comments(&self.topic_id, cursor).await?;
        Ok(Page::new(comments.iter().map(normalize::comment).collect(), next))
    }
}

/// Posts parsed from one rendered web page.
///
/// The web view has no cursor, so this source always yields a single page.
pub struct RenderedPages {
    renderer: Arc<dyn Renderer>,
    url: String,
    timeout: Duration,
    selectors: RenderSelectors,
}

impl RenderedPages {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        url: impl Into<String>,
        timeout: Duration,
        selectors: RenderSelectors,
    ) -> Self {
        Self {
            renderer,
            url: url.into(),
            timeout,
            selectors,
        }
    }
}

#[async_trait]
impl PageSource for RenderedPages {
    type Item = Post;

    fn describe(&self) -> String {
        format!("rendered page {}", self.url)
    }

    async fn fetch_page(&self, _cursor: Option<&str>, _count: usize) -> Result<Page<Post>> {
        let html = self.renderer.render(&self.url, self.timeout).await?;
        Ok(Page::last(parse_posts(&html, &self.selectors)?))
    }
}
