// src/resilience/backoff.rs
// Exponential retry backoff with uniform jitter:
// delay_i = min(max, base * 2^(i-1)) * (1 + U(0, jitter))

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            max_attempts,
            base,
            max,
            jitter,
        }
    }

    /// Delay before retry attempt `attempt` (1-based: the delay after the
    /// first failed try is `delay(1)`).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let raw = self.base.saturating_mul(1u32 << exp);
        let capped = raw.min(self.max);
        let factor = 1.0 + rand::rng().random_range(0.0..=self.jitter.max(0.0));
        capped.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(2000), 0.25)
    }

    #[test]
    fn delays_grow_exponentially_until_cap() {
        let p = RetryPolicy {
            jitter: 0.0,
            ..policy()
        };
        assert_eq!(p.delay(1), Duration::from_millis(100));
        assert_eq!(p.delay(2), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(400));
        assert_eq!(p.delay(10), Duration::from_millis(2000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = policy();
        for _ in 0..100 {
            let d = p.delay(2);
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(250));
        }
    }
}
