//! Randomized rate gate.
//!
//! Every outbound call against a credential context first waits a delay
//! drawn uniformly from `[min_delay, max_delay]`. Rate-limit responses add
//! an extra backoff on top of the draw, which decays again on success.

mod config;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use config::{RateGateConfig, MAX_BACKOFF};

#[derive(Debug, Default)]
struct GateState {
    backoff: Duration,
    total_waits: u64,
    rate_limit_hits: u64,
}

/// Delay enforcer for one credential context.
///
/// Clones share state, so every client built from the same gate is paced
/// together. Never share a gate between independent crawls.
#[derive(Debug, Clone)]
pub struct RateGate {
    config: RateGateConfig,
    state: Arc<Mutex<GateState>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self::with_config(RateGateConfig::default())
    }

    pub fn with_config(config: RateGateConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(GateState::default())),
        }
    }

    /// Draw a delay from the configured interval.
    pub fn draw_delay(&self) -> Duration {
        let min = self.config.min_delay.as_millis() as u64;
        let max = self.config.max_delay.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Block the calling task for a random delay plus any active backoff.
    pub async fn wait(&self) {
        let backoff = {
            let mut state = self.state.lock().await;
            state.total_waits += 1;
            state.backoff
        };

        let delay = self.draw_delay() + backoff;
        if delay > Duration::ZERO {
            debug!("Rate gate: waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Report a rate-limit response (HTTP 429) - grows the extra backoff.
    pub async fn report_rate_limit(&self, status_code: u16) {
        let mut state = self.state.lock().await;
        state.rate_limit_hits += 1;

        let next = if state.backoff.is_zero() {
            self.config.backoff_base
        } else {
            Duration::from_secs_f64(state.backoff.as_secs_f64() * self.config.backoff_multiplier)
        };
        state.backoff = next.min(MAX_BACKOFF);

        warn!(
            "Rate limited (HTTP {}), backing off an extra {:?}",
            status_code, state.backoff
        );
    }

    /// Report a successful call - decays the extra backoff.
    pub async fn report_success(&self) {
        let mut state = self.state.lock().await;
        if state.backoff.is_zero() {
            return;
        }

        let next =
            Duration::from_secs_f64(state.backoff.as_secs_f64() * self.config.recovery_multiplier);
        if next < Duration::from_millis(100) {
            state.backoff = Duration::ZERO;
            info!("Recovered from rate limit backoff");
        } else {
            state.backoff = next;
            debug!("Backoff reduced to {:?}", state.backoff);
        }
    }

    /// Current extra backoff.
    pub async fn backoff(&self) -> Duration {
        self.state.lock().await.backoff
    }

    /// Number of waits performed and rate-limit hits seen.
    pub async fn stats(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.total_waits, state.rate_limit_hits)
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_draw_within_bounds() {
        let gate = RateGate::with_config(RateGateConfig::from_millis(10, 30));
        for _ in 0..200 {
            let d = gate.draw_delay();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(30));
        }
    }

    #[test]
    fn test_from_millis_orders_bounds() {
        let config = RateGateConfig::from_millis(50, 20);
        assert_eq!(config.min_delay, Duration::from_millis(20));
        assert_eq!(config.max_delay, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_wait_sleeps_at_least_min() {
        let gate = RateGate::with_config(RateGateConfig::from_millis(20, 25));
        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(gate.stats().await, (1, 0));
    }

    #[tokio::test]
    async fn test_backoff_grows_and_recovers() {
        let gate = RateGate::with_config(RateGateConfig {
            backoff_base: Duration::from_millis(400),
            ..RateGateConfig::disabled()
        });

        gate.report_rate_limit(429).await;
        assert_eq!(gate.backoff().await, Duration::from_millis(400));
        gate.report_rate_limit(429).await;
        assert_eq!(gate.backoff().await, Duration::from_millis(800));

        for _ in 0..5 {
            gate.report_success().await;
        }
        assert_eq!(gate.backoff().await, Duration::ZERO);
        assert_eq!(gate.stats().await.1, 2);
    }

    #[tokio::test]
    async fn test_backoff_capped() {
        let gate = RateGate::with_config(RateGateConfig {
            backoff_base: Duration::from_secs(50),
            ..RateGateConfig::disabled()
        });
        gate.report_rate_limit(429).await;
        gate.report_rate_limit(429).await;
        assert_eq!(gate.backoff().await, MAX_BACKOFF);
    }
}
