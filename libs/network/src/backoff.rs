//! Jittered exponential reconnect backoff

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    /// Upper bound of the uniform random delay added to every step
    pub jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(10_000),
            jitter: Duration::from_millis(250),
        }
    }
}

impl BackoffConfig {
    pub fn from_millis(base_ms: u64, max_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms),
            jitter: Duration::from_millis(jitter_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    multiplier: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            multiplier: 0,
        }
    }

    /// Delay before the next attempt; doubles per call up to `max`
    pub fn next_delay(&mut self) -> Duration {
        let step = self
            .config
            .base
            .saturating_mul(2u32.saturating_pow(self.multiplier))
            .min(self.config.max);
        // Cap at 2^6 = 64x
        self.multiplier = (self.multiplier + 1).min(6);

        let jitter_ms = self.config.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return step;
        }
        step + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    pub fn reset(&mut self) {
        self.multiplier = 0;
    }
}
