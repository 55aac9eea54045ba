//! Retry backoff: exponential with jitter.

use std::time::Duration;

use rand::Rng;

/// `min(max, base * 2^retry_count) * uniform(0.5, 1.0)`
pub fn backoff_delay(base: Duration, max: Duration, retry_count: u32) -> Duration {
    let exponent = retry_count.min(20);
    let exponential = base.saturating_mul(2u32.saturating_pow(exponent));
    let capped = exponential.min(max);
    let jitter = rand::thread_rng().gen_range(0.5..=1.0);
    capped.mul_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(500);
        let max = Duration::from_secs(30);
        for retry in 0..10 {
            let delay = backoff_delay(base, max, retry);
            let ceiling = base.saturating_mul(2u32.saturating_pow(retry)).min(max);
            assert!(delay <= ceiling, "retry {retry}: {delay:?} > {ceiling:?}");
            assert!(
                delay >= ceiling.mul_f64(0.5),
                "retry {retry}: {delay:?} below jitter floor"
            );
        }
    }

    #[test]
    fn test_backoff_never_exceeds_cap() {
        let delay = backoff_delay(Duration::from_millis(500), Duration::from_secs(30), 30);
        assert!(delay <= Duration::from_secs(30));
    }
}
