//! Rate gate configuration.

use std::time::Duration;

/// Ceiling for the extra delay added after rate-limit responses.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Configuration for the delay enforced before each call.
#[derive(Debug, Clone)]
pub struct RateGateConfig {
    /// Lower bound of the random delay.
    pub min_delay: Duration,
    /// Upper bound of the random delay.
    pub max_delay: Duration,
    /// Extra delay applied on the first rate-limit response.
    pub backoff_base: Duration,
    /// Multiplier for the extra delay on repeated rate limits.
    pub backoff_multiplier: f64,
    /// Multiplier applied to the extra delay after each success (< 1.0).
    pub recovery_multiplier: f64,
}

impl RateGateConfig {
    /// Config with the given bounds in milliseconds and default backoff.
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_delay: Duration::from_millis(min_ms.min(max_ms)),
            max_delay: Duration::from_millis(max_ms.max(min_ms)),
            ..Default::default()
        }
    }

    /// No delay at all; for tests and local fixtures.
    pub fn disabled() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_base: Duration::ZERO,
            ..Default::default()
        }
    }
}

impl Default for RateGateConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2),
            backoff_base: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.5,
        }
    }
}
