//! Capped exponential backoff with jitter.

use rand::rngs::SmallRng;
use rand::Rng;
use uta_core::RetryConfig;

/// Computes redelivery delays: `min(base * 2^attempt, cap)` plus a uniform
/// random spread of `[0, jitter]` so that many entities retrying at once
/// don't synchronize into bursts.
///
/// All delays are in milliseconds; the tracker and runtime share that unit.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    base_ms:      u64,
    cap_ms:       u64,
    jitter_ms:    u64,
    max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base_ms:      config.base_ms.max(1),
            cap_ms:       config.cap_ms.max(config.base_ms.max(1)),
            jitter_ms:    config.jitter_ms,
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before the retry following attempt number `attempt`
    /// (0 = the initial send).
    pub fn delay_ms(&self, attempt: u32, rng: &mut SmallRng) -> u64 {
        // The cap is reached long before 2^20; clamping the exponent keeps
        // the multiplication overflow-free for any attempt count.
        let factor = 1u64 << attempt.min(20);
        let exp = self.base_ms.saturating_mul(factor).min(self.cap_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=self.jitter_ms)
        };
        exp + jitter
    }

    /// `true` once `attempts` deliveries have been made and the policy says
    /// to stop.  A `max_attempts` of 0 never gives up.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}
