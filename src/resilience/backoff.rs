//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before the `attempt`-th retry: `min(base * 2^(attempt-1), cap)`,
/// plus up to 10% jitter so synchronized callers spread out.
pub fn retry_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let cap_ms = cap.as_millis() as u64;
    let exponent = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponent).min(cap_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_retry() {
        let base = Duration::from_millis(100);
        let cap = Duration::from_secs(2);

        let first = retry_delay(1, base, cap);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(110));

        let second = retry_delay(2, base, cap);
        assert!(second >= Duration::from_millis(200));
        assert!(second <= Duration::from_millis(220));

        let third = retry_delay(3, base, cap);
        assert!(third >= Duration::from_millis(400));
        assert!(third <= Duration::from_millis(440));
    }

    #[test]
    fn delay_is_capped() {
        let capped = retry_delay(20, Duration::from_millis(100), Duration::from_secs(1));
        assert!(capped >= Duration::from_secs(1));
        assert!(capped <= Duration::from_millis(1100));
    }

    #[test]
    fn zeroth_attempt_has_no_delay() {
        assert_eq!(
            retry_delay(0, Duration::from_millis(100), Duration::from_secs(1)),
            Duration::ZERO
        );
    }
}
