//! Error types for the retrieval pipeline.

use thiserror::Error;

/// Errors produced while retrieving, normalizing or persisting content.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The provider rejected the session credentials.
    #[error("Credentials rejected by provider: {0}")]
    Auth(String),
    /// The resource does not exist or the session cannot see it.
    #[error("Not found or not accessible: {0}")]
    NotFound(String),
    /// Unexpected status or malformed payload.
    #[error("Provider error (HTTP {status}): {body}")]
    Provider { status: u16, body: String },
    /// The rendered page no longer matches the extraction selectors.
    #[error("Page structure not recognized: {0}")]
    Parse(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The renderer failed to produce HTML for a URL.
    #[error("Render failed: {0}")]
    Render(String),
    #[error("Neither a cookie nor a token was supplied")]
    InvalidCredentials,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CrawlError {
    /// Build a provider error, keeping at most 512 bytes of the body.
    pub fn provider(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > 512 {
            let mut cut = 512;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        CrawlError::Provider { status, body }
    }

    /// Whether a retry of the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrawlError::Provider { .. } | CrawlError::Network(_) | CrawlError::Render(_)
        )
    }

    /// Whether this error should stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CrawlError::Auth(_) | CrawlError::InvalidCredentials | CrawlError::Config(_)
        )
    }

    /// Short operator-facing category.
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::Auth(_) | CrawlError::InvalidCredentials => "credentials expired or invalid",
            CrawlError::NotFound(_) => "resource missing or inaccessible",
            CrawlError::Provider { .. } => "unexpected provider response",
            CrawlError::Parse(_) => "platform structure changed",
            CrawlError::Network(_) | CrawlError::Render(_) => "transient network issue",
            CrawlError::Config(_) => "configuration problem",
            CrawlError::Io(_) | CrawlError::Json(_) | CrawlError::Csv(_) => "local write failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
