use std::time::Duration;

/// Doubles the delay per attempt up to 8x the base.
pub(super) struct Backoff {
    attempt: u32,
    base_ms: u64,
    /// 0 never exhausts.
    max_attempts: u32,
}

impl Backoff {
    pub(super) fn new(base_ms: u64, max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            base_ms: base_ms.max(1),
            max_attempts,
        }
    }

    pub(super) fn next(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.base_ms * 2u64.pow((self.attempt - 1).min(3));
        Duration::from_millis(delay)
    }

    pub(super) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(super) fn is_exhausted(&self) -> bool {
        self.max_attempts > 0 && self.attempt >= self.max_attempts
    }

    pub(super) fn reset(&mut self) {
        self.attempt = 0;
    }
}
