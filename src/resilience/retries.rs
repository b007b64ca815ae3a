//! Retry policy.
//!
//! # Responsibilities
//! - Classify which failures are worth retrying
//! - Enforce a process-wide retry budget so retry storms stay bounded
//!   even when many callers fail at once
//!
//! # Design Decisions
//! - Timeouts, transport errors and 5xx are transient; 4xx and
//!   cancellations are not
//! - Budget is a fraction of recent request volume with a fixed floor,
//!   decayed periodically instead of tracked per-window

use std::sync::atomic::{AtomicU64, Ordering};

use crate::resilience::error::UpstreamError;

/// True when a failure is worth another attempt.
pub fn is_transient(error: &UpstreamError) -> bool {
    match error {
        UpstreamError::Timeout { .. } => true,
        UpstreamError::Transport(_) => true,
        UpstreamError::Stream(_) => true,
        UpstreamError::Status { code } => *code >= 500,
        UpstreamError::Cancelled => false,
    }
}

/// Process-wide retry budget shared by all supervised calls.
pub struct RetryBudget {
    ratio: f32,
    min_retries: u64,
    requests: AtomicU64,
    retries: AtomicU64,
}

impl RetryBudget {
    pub fn new(ratio: f32, min_retries: u32) -> Self {
        Self {
            ratio: ratio.clamp(0.0, 1.0),
            min_retries: min_retries as u64,
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Record one top-level request against the budget's denominator.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Withdraw one retry if the budget allows it.
    pub fn try_withdraw(&self) -> bool {
        let requests = self.requests.load(Ordering::Relaxed);
        let allowed = (requests as f64 * self.ratio as f64) as u64 + self.min_retries;
        let taken = self.retries.fetch_add(1, Ordering::Relaxed);
        if taken < allowed {
            true
        } else {
            self.retries.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }

    /// Halve both counters so the budget tracks recent traffic, not the
    /// whole process lifetime. Called from the maintenance tick.
    pub fn decay(&self) {
        let requests = self.requests.load(Ordering::Relaxed);
        self.requests.store(requests / 2, Ordering::Relaxed);
        let retries = self.retries.load(Ordering::Relaxed);
        self.retries.store(retries / 2, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transient_classification() {
        assert!(is_transient(&UpstreamError::Timeout {
            after: Duration::from_secs(1)
        }));
        assert!(is_transient(&UpstreamError::Transport("reset".into())));
        assert!(is_transient(&UpstreamError::Status { code: 503 }));
        assert!(!is_transient(&UpstreamError::Status { code: 400 }));
        assert!(!is_transient(&UpstreamError::Status { code: 404 }));
        assert!(!is_transient(&UpstreamError::Cancelled));
    }

    #[test]
    fn budget_floor_allows_retries_with_no_traffic() {
        let budget = RetryBudget::new(0.1, 2);
        assert!(budget.try_withdraw());
        assert!(budget.try_withdraw());
        assert!(!budget.try_withdraw());
    }

    #[test]
    fn budget_scales_with_request_volume() {
        let budget = RetryBudget::new(0.5, 0);
        for _ in 0..10 {
            budget.record_request();
        }
        for _ in 0..5 {
            assert!(budget.try_withdraw());
        }
        assert!(!budget.try_withdraw());
    }

    #[test]
    fn decay_frees_part_of_the_budget() {
        let budget = RetryBudget::new(0.0, 2);
        assert!(budget.try_withdraw());
        assert!(budget.try_withdraw());
        assert!(!budget.try_withdraw());

        // 2 withdrawn retries halve to 1: one slot under the floor again.
        budget.decay();
        assert!(budget.try_withdraw());
        assert!(!budget.try_withdraw());
    }
}
