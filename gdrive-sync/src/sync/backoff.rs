use std::time::Duration;

/// Exponential retry delay: `base * 2^(retry - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay before the `retry`-th re-enqueue (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = retry.saturating_sub(1).min(32);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        Duration::from_millis(exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_base_on_each_retry() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(600));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(5), Duration::from_secs(16));
    }

    #[test]
    fn caps_at_max_delay() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_millis(800));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(800));
    }

    #[test]
    fn retry_zero_is_treated_as_first_retry() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(10));
        assert_eq!(backoff.delay(0), Duration::from_millis(250));
    }
}
