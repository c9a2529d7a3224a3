//! Backoff policy for supervised resubscription.

use std::time::Duration;

use rand::Rng;

use temas_core::defaults::{
    RESYNC_BACKOFF_BASE_MS, RESYNC_BACKOFF_CAP_MS, RESYNC_BACKOFF_JITTER,
};

/// Exponential backoff with symmetric jitter.
///
/// Each call to [`next_delay`](Backoff::next_delay) yields the wait before
/// the next attempt: the base doubled per attempt, clamped to the cap, then
/// scaled by a random factor in `1 ± jitter` so simultaneous reconnects
/// spread out. A successful attempt should [`reset`](Backoff::reset) it.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self {
            base,
            cap,
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    /// Attempts scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Compute the delay for the next attempt and advance the counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u64.saturating_pow(self.attempt.min(31));
        let raw_ms = (self.base.as_millis() as u64).saturating_mul(factor);
        let capped_ms = raw_ms.min(self.cap.as_millis() as u64);
        self.attempt = self.attempt.saturating_add(1);

        if self.jitter <= 0.0 {
            return Duration::from_millis(capped_ms);
        }
        let scale = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::from_millis((capped_ms as f64 * scale).round().max(0.0) as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RESYNC_BACKOFF_BASE_MS),
            Duration::from_millis(RESYNC_BACKOFF_CAP_MS),
            RESYNC_BACKOFF_JITTER,
        )
    }
}
