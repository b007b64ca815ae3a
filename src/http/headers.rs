//! Rate-limit feedback headers.
//!
//! Translates a [`RateLimitDecision`] into the conventional header set so
//! the embedding chat controller can attach it to its responses.

use axum::http::{HeaderMap, HeaderValue};

use crate::security::rate_limit::RateLimitDecision;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RETRY_AFTER: &str = "retry-after";

/// Apply rate-limit feedback to a response header map.
pub fn apply_rate_limit_headers(decision: &RateLimitDecision, headers: &mut HeaderMap) {
    headers.insert(LIMIT, numeric(decision.limit as u64));
    headers.insert(REMAINING, numeric(decision.remaining as u64));
    headers.insert(RESET, numeric(decision.reset_at_epoch_secs));
    if !decision.allowed {
        headers.insert(RETRY_AFTER, numeric(decision.retry_after_secs));
    }
}

fn numeric(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).expect("numeric header value")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(allowed: bool) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            limit: 30,
            remaining: if allowed { 29 } else { 0 },
            retry_after_secs: if allowed { 0 } else { 42 },
            reset_at_epoch_secs: 1_700_000_000,
            category: "chat".to_string(),
            tier: "free".to_string(),
        }
    }

    #[test]
    fn allowed_decision_omits_retry_after() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&decision(true), &mut headers);

        assert_eq!(headers[LIMIT], "30");
        assert_eq!(headers[REMAINING], "29");
        assert_eq!(headers[RESET], "1700000000");
        assert!(!headers.contains_key(RETRY_AFTER));
    }

    #[test]
    fn rejected_decision_carries_retry_after() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&decision(false), &mut headers);

        assert_eq!(headers[REMAINING], "0");
        assert_eq!(headers[RETRY_AFTER], "42");
    }
}
