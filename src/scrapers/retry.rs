//! Retry policy applied around individual retrieval calls.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{CrawlError, Result};

/// Default number of attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default constant delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Bounded, constant-delay retry for one call.
///
/// Only errors accepted by the predicate are retried; anything else is
/// returned on the spot. After the last attempt the final error is returned
/// unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    retryable: fn(&CrawlError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retryable: CrawlError::is_retryable,
        }
    }

    /// Replace the retryable-error predicate.
    pub fn with_predicate(mut self, retryable: fn(&CrawlError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn should_retry(&self, err: &CrawlError) -> bool {
        (self.retryable)(err)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && self.should_retry(&e) => {
                    warn!(
                        "{} failed: {}, retrying in {:?} ({}/{})",
                        operation_name, e, self.delay, attempt, self.max_attempts
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if self.should_retry(&e) {
                        error!(
                            "{} failed after {} attempts: {}",
                            operation_name, attempt, e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}
