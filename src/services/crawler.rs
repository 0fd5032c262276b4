//! Crawl orchestration.
//!
//! Ties the retrieval strategies, pagination, media download and sinks into
//! the group and web-page crawls. Emits events for progress display.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::media::MediaFetcher;
use crate::config::Settings;
use crate::error::{CrawlError, Result};
use crate::models::{CredentialContext, Group, Post};
use crate::scrapers::{
    resolve_user_agent, ApiClient, BrowserRenderer, CommentPages, HeaderRotator, HttpClient,
    HttpRenderer, RateGate, RenderedPages, Renderer, RendererKind, TopicPages,
};
use crate::storage::{self, OutputFormat};

/// Which retrieval path produced the posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPath {
    Api,
    Render,
}

/// Progress events emitted during a crawl.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    GroupLoaded(Group),
    TopicsCollected { count: usize, pages: usize },
    FallingBack { url: String, reason: String },
    CommentsCollected { topic_id: String, count: usize },
    ImagesSaved { post_id: String, saved: usize, total: usize },
    Exported(PathBuf),
}

/// What to collect and how to store it.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Target number of posts.
    pub count: usize,
    pub with_comments: bool,
    pub save_images: bool,
    pub format: OutputFormat,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            count: 20,
            with_comments: false,
            save_images: false,
            format: OutputFormat::Json,
        }
    }
}

/// Result of one crawl invocation.
#[derive(Debug)]
pub struct CrawlReport {
    pub group: Option<Group>,
    /// Posts in retrieval order, newest first.
    pub posts: Vec<Post>,
    pub path: RetrievalPath,
    /// Set when retrieval stopped on an error; `posts` holds what came before it.
    pub interrupted: Option<CrawlError>,
    /// Topics whose comments could not be fully fetched.
    pub comment_failures: usize,
    /// Files written by the sinks.
    pub files: Vec<PathBuf>,
}

impl CrawlReport {
    fn new(group: Option<Group>, posts: Vec<Post>, path: RetrievalPath) -> Self {
        Self {
            group,
            posts,
            path,
            interrupted: None,
            comment_failures: 0,
            files: Vec::new(),
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.interrupted.is_some()
    }

    pub fn image_count(&self) -> (usize, usize) {
        let total = self.posts.iter().map(|p| p.images.len()).sum();
        let saved = self
            .posts
            .iter()
            .flat_map(|p| &p.images)
            .filter(|i| i.local_path.is_some())
            .count();
        (saved, total)
    }
}

/// Runs crawls for one credential context.
///
/// Create one per invocation; the rate gate and pinned headers are not
/// meant to be shared between independent crawls.
pub struct Crawler {
    settings: Settings,
    api: ApiClient,
    media: MediaFetcher,
    renderer: Option<Arc<dyn Renderer>>,
    events: Option<mpsc::Sender<CrawlEvent>>,
}

impl Crawler {
    /// Build the HTTP stack and the configured renderer.
    pub fn new(settings: Settings, credentials: CredentialContext) -> Result<Self> {
        let gate = RateGate::with_config(settings.rate_gate_config());
        let rotator = HeaderRotator::new(&settings.web_base_url)
            .with_user_agent(settings.user_agent.clone());
        let http = HttpClient::new(
            credentials.clone(),
            rotator,
            gate,
            settings.request_timeout(),
        )?
        .with_rotation(settings.header_rotation);

        let renderer: Arc<dyn Renderer> = match settings.renderer {
            RendererKind::Browser => Arc::new(BrowserRenderer::new(
                settings.browser.clone(),
                credentials,
                resolve_user_agent(settings.user_agent.as_deref()),
                &settings.web_base_url,
            )),
            RendererKind::Http => Arc::new(HttpRenderer::new(http.clone())),
        };

        Ok(Self {
            api: ApiClient::new(http.clone(), &settings.api_base_url),
            media: MediaFetcher::new(http),
            renderer: Some(renderer),
            settings,
            events: None,
        })
    }

    /// Replace the renderer; `None` disables the render path and fallback.
    pub fn with_renderer(mut self, renderer: Option<Arc<dyn Renderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<CrawlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    async fn emit(&self, event: CrawlEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Validate the credentials by fetching the group snapshot.
    pub async fn check_credentials(&self, group_id: &str) -> Result<Group> {
        let group = self
            .settings
            .retry_policy()
            .run(&format!("group info {}", group_id), || {
                self.api.get_group_info(group_id)
            })
            .await?;
        self.emit(CrawlEvent::GroupLoaded(group.clone())).await;
        Ok(group)
    }

    /// Crawl a group: info, topics, optional comments and images, then export.
    ///
    /// When the API fails before yielding any topic with an error a retry
    /// could fix, the group's web view is rendered instead. This includes a
    /// failed group info call; the report then has no group snapshot.
    pub async fn crawl_group(&self, group_id: &str, options: &CrawlOptions) -> Result<CrawlReport> {
        let group = match self.check_credentials(group_id).await {
            Ok(group) => group,
            Err(e) if self.can_fall_back(&e) => {
                let report = self.fall_back(group_id, None, e, options.count).await?;
                return self.finish(report, options, storage::GROUP_EXPORT).await;
            }
            Err(e) => return Err(e),
        };

        let source = TopicPages::new(self.api.clone(), group_id);
        let outcome = self
            .settings
            .topic_paginator()
            .collect(&source, Some(options.count))
            .await;
        let pages = outcome.pages;
        let (posts, error) = outcome.into_parts();

        let mut report = match error {
            Some(e) if posts.is_empty() && self.can_fall_back(&e) => {
                self.fall_back(group_id, Some(group), e, options.count)
                    .await?
            }
            Some(e) if posts.is_empty() => return Err(e),
            other => {
                self.emit(CrawlEvent::TopicsCollected {
                    count: posts.len(),
                    pages,
                })
                .await;
                let mut report = CrawlReport::new(Some(group), posts, RetrievalPath::Api);
                report.interrupted = other;
                report
            }
        };

        if options.with_comments && report.path == RetrievalPath::Api {
            self.attach_comments(&mut report).await;
        }

        self.finish(report, options, storage::GROUP_EXPORT).await
    }

    /// Crawl one web page through the renderer, then export.
    ///
    /// Exports use their own file names so a web crawl never replaces a
    /// group export in the same output directory.
    pub async fn crawl_web_page(&self, url: &str, options: &CrawlOptions) -> Result<CrawlReport> {
        let report = self.render_posts(url, None).await?;
        self.finish(report, options, storage::WEB_EXPORT).await
    }

    fn can_fall_back(&self, error: &CrawlError) -> bool {
        error.is_retryable() && self.renderer.is_some()
    }

    /// Render the group's web view after the API failed with `cause`.
    ///
    /// If rendering fails too, `cause` is returned.
    async fn fall_back(
        &self,
        group_id: &str,
        group: Option<Group>,
        cause: CrawlError,
        count: usize,
    ) -> Result<CrawlReport> {
        let url = self.settings.group_web_url(group_id);
        warn!("API retrieval failed ({}), rendering {}", cause, url);
        self.emit(CrawlEvent::FallingBack {
            url: url.clone(),
            reason: cause.to_string(),
        })
        .await;

        match self.render_posts(&url, Some(count)).await {
            Ok(mut report) => {
                report.group = group;
                Ok(report)
            }
            Err(render_err) => {
                warn!("Render fallback failed: {}", render_err);
                Err(cause)
            }
        }
    }

    async fn render_posts(&self, url: &str, target: Option<usize>) -> Result<CrawlReport> {
        let renderer = self
            .renderer
            .clone()
            .ok_or_else(|| CrawlError::Config("no renderer configured".to_string()))?;

        let source = RenderedPages::new(
            renderer,
            url,
            self.settings.render_timeout(),
            self.settings.selectors.clone(),
        );
        let outcome = self.settings.topic_paginator().collect(&source, target).await;
        let pages = outcome.pages;
        let (posts, error) = outcome.into_parts();

        if let Some(e) = error {
            return Err(e);
        }

        self.emit(CrawlEvent::TopicsCollected {
            count: posts.len(),
            pages,
        })
        .await;
        Ok(CrawlReport::new(None, posts, RetrievalPath::Render))
    }

    async fn attach_comments(&self, report: &mut CrawlReport) {
        let paginator = self.settings.comment_paginator();

        for post in report.posts.iter_mut() {
            if !post.has_comments() {
                post.comments = Some(Vec::new());
                continue;
            }

            let source = CommentPages::new(self.api.clone(), post.id.clone());
            let outcome = paginator.collect(&source, None).await;
            let (comments, error) = outcome.into_parts();

            self.emit(CrawlEvent::CommentsCollected {
                topic_id: post.id.clone(),
                count: comments.len(),
            })
            .await;
            post.comments = Some(comments);

            if let Some(e) = error {
                report.comment_failures += 1;
                warn!("Comments of topic {} incomplete: {}", post.id, e);
                if e.is_fatal() {
                    warn!("Skipping remaining comments: {}", e.kind());
                    break;
                }
            }
        }
    }

    async fn finish(
        &self,
        mut report: CrawlReport,
        options: &CrawlOptions,
        stem: &str,
    ) -> Result<CrawlReport> {
        if options.save_images {
            let image_dir = self.settings.image_dir();
            let posts = std::mem::take(&mut report.posts);
            for post in posts {
                let post = self.media.fetch_all(post, &image_dir).await;
                let saved = post.images.iter().filter(|i| i.local_path.is_some()).count();
                if !post.images.is_empty() {
                    self.emit(CrawlEvent::ImagesSaved {
                        post_id: post.id.clone(),
                        saved,
                        total: post.images.len(),
                    })
                    .await;
                }
                report.posts.push(post);
            }
        }

        report.files =
            storage::export(&report.posts, &self.settings.output_dir, stem, options.format)?;
        for file in &report.files {
            self.emit(CrawlEvent::Exported(file.clone())).await;
        }

        info!(
            "Crawl finished: {} posts via {:?}{}",
            report.posts.len(),
            report.path,
            if report.is_truncated() { " (truncated)" } else { "" }
        );

        let gate = self.api.http().rate_gate();
        let (waits, limited) = gate.stats().await;
        if limited > 0 {
            info!(
                "Paced {} requests, {} rate limited, backoff now {:?}",
                waits,
                limited,
                gate.backoff().await
            );
        }
        Ok(report)
    }

    /// Shut down the renderer, if it holds a browser.
    pub async fn close(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.close().await;
        }
    }
}
