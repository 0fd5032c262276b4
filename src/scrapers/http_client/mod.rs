//! HTTP client bound to one credential context.
//!
//! Every request waits on the rate gate, carries a rotated header set and
//! the session cookie, and reports rate-limit responses back to the gate.

mod headers;
mod response;
mod user_agent;

pub use headers::HeaderRotator;
pub use response::HttpResponse;
pub use user_agent::{random_user_agent, resolve_user_agent, BROWSER_USER_AGENTS};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::rate_limiter::RateGate;
use crate::error::{CrawlError, Result};
use crate::models::CredentialContext;

/// How often the header set changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HeaderRotation {
    /// New user agent on every request.
    #[default]
    PerRequest,
    /// First rotated user agent is pinned on the context for the whole crawl.
    PerCrawl,
}

/// HTTP client with rate gating and header rotation.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    credentials: Arc<RwLock<CredentialContext>>,
    rotator: HeaderRotator,
    rotation: HeaderRotation,
    gate: RateGate,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(
        credentials: CredentialContext,
        rotator: HeaderRotator,
        gate: RateGate,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            credentials: Arc::new(RwLock::new(credentials)),
            rotator,
            rotation: HeaderRotation::default(),
            gate,
        })
    }

    /// Set the header rotation mode.
    pub fn with_rotation(mut self, rotation: HeaderRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Get the rate gate for this client.
    pub fn rate_gate(&self) -> &RateGate {
        &self.gate
    }

    /// Headers for the next request, pinning them first if rotation is per crawl.
    pub async fn next_headers(&self) -> HashMap<String, String> {
        let headers = {
            let ctx = self.credentials.read().await;
            self.rotator.next_headers(&ctx)
        };

        if self.rotation == HeaderRotation::PerCrawl {
            let mut ctx = self.credentials.write().await;
            if !ctx.headers.contains_key("User-Agent") {
                if let Some(ua) = headers.get("User-Agent") {
                    debug!("Pinning user agent for this crawl: {}", ua);
                    ctx.headers.insert("User-Agent".to_string(), ua.clone());
                }
            }
        }

        headers.into_iter().collect()
    }

    /// Make a GET request and read the whole body.
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        self.gate.wait().await;

        let mut request = self.client.get(url).query(query);
        for (name, value) in self.next_headers().await {
            request = request.header(name, value);
        }

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();

        let body = response.bytes().await?.to_vec();
        debug!(
            "GET {} -> {} ({} bytes, {:?})",
            url,
            status.as_u16(),
            body.len(),
            start.elapsed()
        );

        let response = HttpResponse { status, body };

        if response.is_rate_limited() {
            self.gate.report_rate_limit(status.as_u16()).await;
        } else if response.is_success() {
            self.gate.report_success().await;
        }

        Ok(response)
    }

    /// Get page content as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url, &[]).await?;
        if !response.is_success() {
            return Err(CrawlError::provider(
                response.status.as_u16(),
                response.text(),
            ));
        }
        Ok(response.text())
    }

    /// Download raw bytes, failing on non-2xx.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url, &[]).await?;
        if !response.is_success() {
            return Err(CrawlError::provider(
                response.status.as_u16(),
                format!("download of {} failed", url),
            ));
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::rate_limiter::RateGateConfig;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(rotation: HeaderRotation) -> HttpClient {
        HttpClient::new(
            CredentialContext::from_token("TOKEN").unwrap(),
            HeaderRotator::new("https://wx.zsxq.com"),
            RateGate::with_config(RateGateConfig::disabled()),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_rotation(rotation)
    }

    #[tokio::test]
    async fn test_get_sends_cookie_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/ping"))
            .and(query_param("count", "20"))
            .and(header("cookie", "zsxq_access_token=TOKEN"))
            .and(header("origin", "https://wx.zsxq.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(HeaderRotation::PerRequest);
        let response = client
            .get(
                &format!("{}/v2/ping", server.uri()),
                &[("count", "20".to_string())],
            )
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.text(), "pong");
    }

    #[tokio::test]
    async fn test_rate_limit_reported_to_gate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = client(HeaderRotation::PerRequest);
        let response = client.get(&server.uri(), &[]).await.unwrap();
        assert!(response.is_rate_limited());
        assert_eq!(client.rate_gate().stats().await.1, 1);
    }

    #[tokio::test]
    async fn test_get_bytes_fails_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(HeaderRotation::PerRequest)
            .get_bytes(&format!("{}/missing.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Provider { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_per_crawl_rotation_pins_user_agent() {
        let client = client(HeaderRotation::PerCrawl);
        let first = client.next_headers().await;
        for _ in 0..5 {
            assert_eq!(client.next_headers().await["User-Agent"], first["User-Agent"]);
        }
        assert!(client
            .credentials
            .read()
            .await
            .headers
            .contains_key("User-Agent"));
    }
}
