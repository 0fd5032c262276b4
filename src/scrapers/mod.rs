//! Retrieval strategies and the plumbing they share.

pub mod api;
pub mod browser;
mod http_client;
pub mod pagination;
pub mod rate_limiter;
pub mod render;
pub mod retry;
pub mod source;

pub use api::ApiClient;
pub use browser::{BrowserRenderer, BrowserSettings};
pub use http_client::{
    random_user_agent, resolve_user_agent, HeaderRotation, HeaderRotator, HttpClient,
    HttpResponse, BROWSER_USER_AGENTS,
};
pub use pagination::{CrawlOutcome, Paginator, StopReason};
pub use rate_limiter::{RateGate, RateGateConfig};
pub use render::{parse_posts, HttpRenderer, RenderSelectors, Renderer, RendererKind};
pub use retry::RetryPolicy;
pub use source::{CommentPages, Page, PageSource, RenderedPages, TopicPages};
