//! Configuration management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CrawlError, Result};
use crate::scrapers::api::DEFAULT_API_BASE_URL;
use crate::scrapers::pagination::{DEFAULT_PAGE_SIZE, DEFAULT_STALL_LIMIT};
use crate::scrapers::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::scrapers::{
    BrowserSettings, HeaderRotation, Paginator, RateGateConfig, RenderSelectors, RendererKind,
    RetryPolicy,
};

/// Default web origin.
pub const DEFAULT_WEB_BASE_URL: &str = "https://wx.zsxq.com";

/// Default output directory.
const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Images subdirectory inside the output directory.
const IMAGES_SUBDIR: &str = "images";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where exports and images are written.
    pub output_dir: PathBuf,
    /// Root of the JSON API.
    pub api_base_url: String,
    /// Origin of the web view, used for referer/origin headers and rendering.
    pub web_base_url: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Lower bound of the random delay before each request.
    pub min_delay_ms: u64,
    /// Upper bound of the random delay before each request.
    pub max_delay_ms: u64,
    /// Attempts per page or comment fetch.
    pub retry_attempts: u32,
    /// Constant delay between attempts.
    pub retry_delay_ms: u64,
    /// Pages without a new record before pagination stops.
    pub stall_limit: u32,
    /// Topics requested per page.
    pub page_size: usize,
    /// Hard cap on topic pages.
    pub max_pages: Option<usize>,
    /// Hard cap on comment pages per topic.
    pub max_comment_pages: Option<usize>,
    pub header_rotation: HeaderRotation,
    /// Fixed user agent; rotated from the pool when unset.
    pub user_agent: Option<String>,
    pub renderer: RendererKind,
    pub browser: BrowserSettings,
    pub selectors: RenderSelectors,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            web_base_url: DEFAULT_WEB_BASE_URL.to_string(),
            request_timeout: 30,
            min_delay_ms: 1000,
            max_delay_ms: 2000,
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            stall_limit: DEFAULT_STALL_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
            max_comment_pages: None,
            header_rotation: HeaderRotation::default(),
            user_agent: None,
            renderer: RendererKind::default(),
            browser: BrowserSettings::default(),
            selectors: RenderSelectors::default(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.timeout)
    }

    pub fn rate_gate_config(&self) -> RateGateConfig {
        RateGateConfig::from_millis(self.min_delay_ms, self.max_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    /// Paginator for topic lists.
    pub fn topic_paginator(&self) -> Paginator {
        Paginator::new(self.retry_policy())
            .with_page_size(self.page_size)
            .with_stall_limit(self.stall_limit)
            .with_max_pages(self.max_pages)
    }

    /// Paginator for the comments of one topic.
    pub fn comment_paginator(&self) -> Paginator {
        Paginator::new(self.retry_policy())
            .with_stall_limit(self.stall_limit)
            .with_max_pages(self.max_comment_pages)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.output_dir.join(IMAGES_SUBDIR)
    }

    /// Web view of a group, used by the render path.
    pub fn group_web_url(&self, group_id: &str) -> String {
        format!(
            "{}/dweb2/index/group/{}",
            self.web_base_url.trim_end_matches('/'),
            group_id
        )
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_base_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_comment_pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_rotation: Option<HeaderRotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<RenderSelectors>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers zsxq config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("zsxq").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Ignoring config file {}: {}", path.display(), e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(e) => {
                debug!("No config file found: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            CrawlError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| CrawlError::Config(format!("failed to parse TOML config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| CrawlError::Config(format!("failed to parse YAML config: {}", e)))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| CrawlError::Config(format!("failed to parse JSON config: {}", e)))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, if one was loaded.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref dir) = self.output_dir {
            settings.output_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref url) = self.api_base_url {
            settings.api_base_url = url.clone();
        }
        if let Some(ref url) = self.web_base_url {
            settings.web_base_url = url.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(ms) = self.min_delay_ms {
            settings.min_delay_ms = ms;
        }
        if let Some(ms) = self.max_delay_ms {
            settings.max_delay_ms = ms;
        }
        if let Some(attempts) = self.retry_attempts {
            settings.retry_attempts = attempts;
        }
        if let Some(ms) = self.retry_delay_ms {
            settings.retry_delay_ms = ms;
        }
        if let Some(limit) = self.stall_limit {
            settings.stall_limit = limit;
        }
        if let Some(size) = self.page_size {
            settings.page_size = size;
        }
        if self.max_pages.is_some() {
            settings.max_pages = self.max_pages;
        }
        if self.max_comment_pages.is_some() {
            settings.max_comment_pages = self.max_comment_pages;
        }
        if let Some(rotation) = self.header_rotation {
            settings.header_rotation = rotation;
        }
        if let Some(ref ua) = self.user_agent {
            settings.user_agent = Some(ua.clone());
        }
        if let Some(renderer) = self.renderer {
            settings.renderer = renderer;
        }
        if let Some(ref browser) = self.browser {
            settings.browser = browser.clone();
        }
        if let Some(ref selectors) = self.selectors {
            settings.selectors = selectors.clone();
        }
    }
}

/// Options controlling where settings come from.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (skips discovery).
    pub config_path: Option<PathBuf>,
    /// Resolve relative paths from the current directory instead of the
    /// config file's directory.
    pub use_cwd: bool,
}

/// Load settings: defaults, then the config file.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config)> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd
    } else {
        config.base_dir().unwrap_or(cwd)
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    if let Some(ref path) = config.source_path {
        debug!("Loaded config from {}", path.display());
    }

    Ok((settings, config))
}
