// Reconnect policy for the push stream
use super::constants::{
    DEFAULT_RECONNECT_BACKOFF_FACTOR, DEFAULT_RECONNECT_BASE_DELAY_MS,
    DEFAULT_RECONNECT_MAX_ATTEMPTS, DEFAULT_RECONNECT_MAX_DELAY_MS,
};
use std::time::Duration;
use tracing::{info, warn};

/// Reconnect decision result
#[derive(Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after the given delay
    Retry(Duration),
    /// Stop reconnecting; the stream stays down
    GiveUp,
}

/// Exponential backoff for a dropped push connection
///
/// delay = min(base_delay * (backoff_factor ^ attempt), max_delay) * (1.0 ± 0.1)
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    backoff_factor: f64,
    /// None = retry forever
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Create a new reconnect policy
    ///
    /// # Arguments
    /// * `base_delay_ms` - Delay before the first reconnect
    /// * `max_delay_ms` - Cap for any single delay
    /// * `backoff_factor` - Growth per failed attempt
    /// * `max_attempts` - Consecutive failures before giving up (None = never)
    pub fn new(
        base_delay_ms: u64,
        max_delay_ms: u64,
        backoff_factor: f64,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            backoff_factor: backoff_factor.max(1.0),
            max_attempts,
        }
    }

    /// Never reconnect
    pub fn disabled() -> Self {
        Self::new(0, 0, 1.0, Some(0))
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Decide whether to reconnect after `attempt` consecutive failures
    ///
    /// `attempt` is 0 for the first failure. `seed` spreads the jitter so
    /// many clients do not reconnect in lockstep.
    pub fn should_reconnect(&self, attempt: u32, seed: &str) -> ReconnectDecision {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                warn!(attempt, max_attempts = max, "Max reconnect attempts reached");
                return ReconnectDecision::GiveUp;
            }
        }

        let exp = self.backoff_factor.powi(attempt.min(32) as i32);
        let capped = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);

        // ±10% jitter, deterministic per seed and attempt
        let jitter_seed = seed.chars().map(|c| c as u32).sum::<u32>().wrapping_add(attempt);
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0);

        let delay_ms = (capped * jitter_factor) as u64;

        info!(attempt, delay_ms, "Scheduling stream reconnect");

        ReconnectDecision::Retry(Duration::from_millis(delay_ms))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RECONNECT_BASE_DELAY_MS,
            DEFAULT_RECONNECT_MAX_DELAY_MS,
            DEFAULT_RECONNECT_BACKOFF_FACTOR,
            Some(DEFAULT_RECONNECT_MAX_ATTEMPTS),
        )
    }
}
