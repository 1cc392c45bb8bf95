//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential delay for `attempt` (1-based), capped at `max_ms`, plus up
/// to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(63));
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

/// Delay before requeueing a delivery seen `attempt` times.
pub fn retry_delay(attempt: u32, retries: &RetryConfig) -> Duration {
    calculate_backoff(attempt, retries.base_delay_ms, retries.max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_then_caps() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);

        let first = calculate_backoff(1, 100, 2000).as_millis();
        assert!((100..110).contains(&first));

        let third = calculate_backoff(3, 100, 2000).as_millis();
        assert!((400..440).contains(&third));

        let capped = calculate_backoff(40, 100, 1000).as_millis();
        assert!((1000..1100).contains(&capped));
    }

    #[test]
    fn test_retry_delay_uses_config() {
        let retries = RetryConfig {
            base_delay_ms: 10,
            max_delay_ms: 10,
        };
        assert!(retry_delay(5, &retries) < Duration::from_millis(11));
    }
}
