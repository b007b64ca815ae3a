//! Tiered rate limiting.
//!
//! # Responsibilities
//! - Gate requests by (caller category, plan tier) quotas before any
//!   breaker admission or upstream I/O
//! - Report full feedback (remaining, reset time) for response headers
//!
//! # Design Decisions
//! - Fixed-window counters keyed by (identity, category); expired windows
//!   reset atomically under the same lock as the check
//! - Quota lookup falls back to a configured default for unknown pairs
//! - Never performs I/O; purely in-memory accounting

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::schema::RateLimitConfig;
use crate::observability::metrics;

/// Outcome of one admission check, suitable for response headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets; 0 when allowed.
    pub retry_after_secs: u64,
    pub reset_at_epoch_secs: u64,
    pub category: String,
    pub tier: String,
}

#[derive(Debug, Clone, Copy)]
struct Quota {
    limit: u32,
    window: Duration,
}

/// One fixed window of consumption for an (identity, category) pair.
struct Window {
    started: Instant,
    started_at: SystemTime,
    duration: Duration,
    count: u32,
}

impl Window {
    fn new(duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            started_at: SystemTime::now(),
            duration,
            count: 0,
        }
    }

    fn expired(&self) -> bool {
        self.started.elapsed() >= self.duration
    }

    fn reset(&mut self, duration: Duration) {
        self.started = Instant::now();
        self.started_at = SystemTime::now();
        self.duration = duration;
        self.count = 0;
    }

    fn reset_at_epoch_secs(&self) -> u64 {
        (self.started_at + self.duration)
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Fixed-window rate limiter with per (category, tier) quotas.
pub struct TieredRateLimiter {
    enabled: bool,
    quotas: HashMap<(String, String), Quota>,
    default_quota: Quota,
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl TieredRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let quotas = config
            .quotas
            .iter()
            .map(|q| {
                (
                    (q.category.clone(), q.tier.clone()),
                    Quota {
                        limit: q.limit,
                        window: Duration::from_secs(q.window_secs.max(1)),
                    },
                )
            })
            .collect();
        Self {
            enabled: config.enabled,
            quotas,
            default_quota: Quota {
                limit: config.default_limit,
                window: Duration::from_secs(config.default_window_secs.max(1)),
            },
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and consume quota for one request. Runs strictly before
    /// breaker admission.
    pub fn admit(&self, identity: &str, category: &str, tier: &str) -> RateLimitDecision {
        let quota = self
            .quotas
            .get(&(category.to_string(), tier.to_string()))
            .copied()
            .unwrap_or(self.default_quota);

        if !self.enabled {
            return RateLimitDecision {
                allowed: true,
                limit: quota.limit,
                remaining: quota.limit,
                retry_after_secs: 0,
                reset_at_epoch_secs: 0,
                category: category.to_string(),
                tier: tier.to_string(),
            };
        }

        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let window = windows
            .entry((identity.to_string(), category.to_string()))
            .or_insert_with(|| Window::new(quota.window));

        if window.expired() {
            window.reset(quota.window);
        }

        if window.count < quota.limit {
            window.count += 1;
            RateLimitDecision {
                allowed: true,
                limit: quota.limit,
                remaining: quota.limit - window.count,
                retry_after_secs: 0,
                reset_at_epoch_secs: window.reset_at_epoch_secs(),
                category: category.to_string(),
                tier: tier.to_string(),
            }
        } else {
            let remaining_window = quota.window.saturating_sub(window.started.elapsed());
            let retry_after_secs = remaining_window.as_secs().max(1);
            tracing::warn!(
                identity = %identity,
                category = %category,
                tier = %tier,
                retry_after_secs,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(category, tier);
            RateLimitDecision {
                allowed: false,
                limit: quota.limit,
                remaining: 0,
                retry_after_secs,
                reset_at_epoch_secs: window.reset_at_epoch_secs(),
                category: category.to_string(),
                tier: tier.to_string(),
            }
        }
    }

    /// Drop windows that expired long enough ago to be dead weight.
    /// Called from the maintenance tick.
    pub fn purge_expired(&self) {
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        windows.retain(|_, window| window.started.elapsed() < window.duration * 2);
    }

    #[cfg(test)]
    fn tracked_windows(&self) -> usize {
        self.windows.lock().expect("rate limiter mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::QuotaConfig;
    use std::thread;

    fn limiter(quotas: Vec<QuotaConfig>) -> TieredRateLimiter {
        TieredRateLimiter::new(&RateLimitConfig {
            enabled: true,
            default_limit: 2,
            default_window_secs: 60,
            quotas,
            ..Default::default()
        })
    }

    #[test]
    fn admits_exactly_the_limit_then_rejects_with_retry_after() {
        let limiter = limiter(vec![QuotaConfig::new("chat", "free", 5, 60)]);

        for i in 0..5 {
            let decision = limiter.admit("user-1", "chat", "free");
            assert!(decision.allowed, "admission {i} within quota");
            assert_eq!(decision.remaining, 4 - i);
        }

        let rejected = limiter.admit("user-1", "chat", "free");
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert!(rejected.retry_after_secs > 0);
        assert!(rejected.retry_after_secs <= 60);
        assert!(rejected.reset_at_epoch_secs > 0);
    }

    #[test]
    fn identities_and_categories_are_independent() {
        let limiter = limiter(vec![
            QuotaConfig::new("chat", "free", 1, 60),
            QuotaConfig::new("image", "free", 1, 60),
        ]);

        assert!(limiter.admit("user-1", "chat", "free").allowed);
        assert!(!limiter.admit("user-1", "chat", "free").allowed);

        // Different identity, same category.
        assert!(limiter.admit("user-2", "chat", "free").allowed);
        // Same identity, different category.
        assert!(limiter.admit("user-1", "image", "free").allowed);
    }

    #[test]
    fn tier_selects_the_quota() {
        let limiter = limiter(vec![
            QuotaConfig::new("chat", "free", 1, 60),
            QuotaConfig::new("chat", "premium", 3, 60),
        ]);

        assert!(limiter.admit("free-user", "chat", "free").allowed);
        assert!(!limiter.admit("free-user", "chat", "free").allowed);

        for _ in 0..3 {
            assert!(limiter.admit("premium-user", "chat", "premium").allowed);
        }
        assert!(!limiter.admit("premium-user", "chat", "premium").allowed);
    }

    #[test]
    fn unknown_pair_uses_the_default_quota() {
        let limiter = limiter(vec![]);
        assert!(limiter.admit("user-1", "transcribe", "trial").allowed);
        assert!(limiter.admit("user-1", "transcribe", "trial").allowed);
        assert!(!limiter.admit("user-1", "transcribe", "trial").allowed);
    }

    #[test]
    fn window_expiry_resets_the_count() {
        let limiter = TieredRateLimiter::new(&RateLimitConfig {
            enabled: true,
            default_limit: 1,
            default_window_secs: 1,
            quotas: vec![],
            ..Default::default()
        });

        assert!(limiter.admit("user-1", "chat", "free").allowed);
        assert!(!limiter.admit("user-1", "chat", "free").allowed);

        thread::sleep(Duration::from_millis(1100));
        assert!(limiter.admit("user-1", "chat", "free").allowed);
    }

    #[test]
    fn purge_drops_long_expired_windows() {
        let limiter = TieredRateLimiter::new(&RateLimitConfig {
            enabled: true,
            default_limit: 1,
            default_window_secs: 1,
            quotas: vec![],
            ..Default::default()
        });

        limiter.admit("user-1", "chat", "free");
        assert_eq!(limiter.tracked_windows(), 1);

        thread::sleep(Duration::from_millis(2100));
        limiter.purge_expired();
        assert_eq!(limiter.tracked_windows(), 0);
    }

    #[test]
    fn disabled_limiter_admits_everything() {
        let limiter = TieredRateLimiter::new(&RateLimitConfig {
            enabled: false,
            default_limit: 1,
            default_window_secs: 60,
            quotas: vec![],
            ..Default::default()
        });

        for _ in 0..10 {
            assert!(limiter.admit("user-1", "chat", "free").allowed);
        }
    }
}
