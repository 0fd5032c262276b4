//! Headless browser renderer.
//!
//! Uses chromiumoxide (CDP) to load the web view with the session cookies
//! injected, so pages that only render client-side can still be parsed.

mod config;
mod cookies;

pub use config::BrowserSettings;
pub use cookies::cookie_domain;

use std::time::Duration;

use async_trait::async_trait;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use rand::Rng;

use super::render::Renderer;
use crate::error::{CrawlError, Result};
use crate::models::CredentialContext;

#[cfg(feature = "browser")]
fn render_error(context: &str, e: impl std::fmt::Display) -> CrawlError {
    CrawlError::Render(format!("{}: {}", context, e))
}

/// Renderer backed by a Chrome instance.
#[cfg(feature = "browser")]
pub struct BrowserRenderer {
    config: BrowserSettings,
    credentials: CredentialContext,
    user_agent: String,
    cookie_domain: String,
    browser: Mutex<Option<Browser>>,
}

#[cfg(feature = "browser")]
impl BrowserRenderer {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    /// Create a renderer; the browser is started on first use.
    pub fn new(
        config: BrowserSettings,
        credentials: CredentialContext,
        user_agent: String,
        web_base_url: &str,
    ) -> Self {
        Self {
            config,
            credentials,
            user_agent,
            cookie_domain: cookie_domain(web_base_url),
            browser: Mutex::new(None),
        }
    }

    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(CrawlError::Config(
            "Chrome/Chromium not found; install it, set browser.remote_url, \
             or use --renderer http"
                .to_string(),
        ))
    }

    async fn launch(&self) -> Result<Browser> {
        if let Some(remote_url) = &self.config.remote_url {
            return self.connect_remote(remote_url).await;
        }

        info!("Launching browser (headless={})", self.config.headless);

        let mut builder = BrowserConfig::builder().chrome_executable(Self::find_chrome()?);
        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| render_error("invalid browser config", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| render_error("failed to launch browser", e))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn connect_remote(&self, url: &str) -> Result<Browser> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, self.config.timeout
        );

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await?
            .json()
            .await?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CrawlError::Render("no webSocketDebuggerUrl in response".into()))?;

        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.timeout),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| render_error("failed to connect to remote browser", e))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn pause(min_ms: u64, max_ms: u64) {
        let ms = rand::rng().random_range(min_ms..=max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn settle(&self, page: &Page, timeout: Duration) {
        let wait_for_ready_script = r#"
            new Promise((resolve) => {
                if (document.readyState === 'complete' || document.readyState === 'interactive') {
                    resolve(document.readyState);
                } else {
                    document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                    setTimeout(() => resolve('timeout'), 10000);
                }
            })
        "#;

        match tokio::time::timeout(timeout, page.evaluate(wait_for_ready_script.to_string())).await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }

        if let Some(ref selector) = self.config.wait_for_selector {
            debug!("Waiting for selector: {}", selector);
            match tokio::time::timeout(timeout, page.find_element(selector.as_str())).await {
                Ok(Ok(_)) => debug!("Selector found"),
                Ok(Err(e)) => warn!("Selector not found: {}", e),
                Err(_) => warn!("Timeout waiting for selector {}", selector),
            }
        }

        if self.config.scroll {
            for script in [
                "window.scrollTo(0, document.body.scrollHeight / 2)",
                "window.scrollTo(0, document.body.scrollHeight)",
            ] {
                if let Err(e) = page.evaluate(script.to_string()).await {
                    debug!("Scroll skipped: {}", e);
                }
                Self::pause(1000, 3000).await;
            }
        }
    }

    async fn render_page(&self, page: &Page, url: &str, timeout: Duration) -> Result<String> {
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(|e| render_error("failed to set user agent", e))?;

        cookies::inject_cookies(page, &self.credentials, &self.cookie_domain).await;

        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| render_error("invalid URL", e))?;

        match tokio::time::timeout(timeout, page.execute(nav_params)).await {
            Ok(result) => {
                result.map_err(|e| render_error("navigation failed", e))?;
            }
            Err(_) => {
                return Err(CrawlError::Render(format!(
                    "timed out after {:?} loading {}",
                    timeout, url
                )))
            }
        }

        self.settle(page, timeout).await;

        page.content()
            .await
            .map_err(|e| render_error("failed to read page content", e))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Renderer for BrowserRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String> {
        let mut guard = self.browser.lock().await;
        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }
        let browser = guard
            .as_ref()
            .ok_or_else(|| CrawlError::Render("browser not available".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| render_error("failed to open page", e))?;

        let result = self.render_page(&page, url, timeout).await;

        let _ = page.close().await;
        result
    }

    async fn close(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
        }
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserRenderer {
    _config: BrowserSettings,
}

#[cfg(not(feature = "browser"))]
impl BrowserRenderer {
    pub fn new(
        config: BrowserSettings,
        _credentials: CredentialContext,
        _user_agent: String,
        _web_base_url: &str,
    ) -> Self {
        Self { _config: config }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl Renderer for BrowserRenderer {
    async fn render(&self, _url: &str, _timeout: Duration) -> Result<String> {
        Err(CrawlError::Config(
            "Browser support not compiled. Rebuild with: cargo build --features browser, \
             or use --renderer http"
                .to_string(),
        ))
    }
}
