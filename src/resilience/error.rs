//! Typed outcomes for upstream calls.
//!
//! # Design Decisions
//! - The core never renders user-facing text; callers map these variants
//! - Admission rejection is a value (`CallError::Rejected`), not a panic or
//!   a downcast-matched error class
//! - Failure classification is pluggable per dependency via [`FailurePredicate`]

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error raised by (or on behalf of) an upstream call attempt.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The call exceeded the breaker's per-call deadline.
    #[error("upstream call timed out after {after:?}")]
    Timeout { after: Duration },

    /// Connection-level failure: refused, reset, DNS, TLS.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success HTTP status.
    #[error("upstream returned status {code}")]
    Status { code: u16 },

    /// The caller aborted the call (user closed the chat).
    #[error("call cancelled by caller")]
    Cancelled,

    /// The response stream broke after it was established.
    #[error("stream error: {0}")]
    Stream(String),
}

impl UpstreamError {
    /// True for 4xx responses: the request was wrong, not the upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(self, UpstreamError::Status { code } if (400..500).contains(code))
    }
}

/// Result of a breaker-mediated call.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The breaker refused admission; no upstream I/O happened.
    #[error("circuit open; retry after {retry_after:?}")]
    Rejected { retry_after: Duration },

    /// The call was admitted and failed.
    #[error(transparent)]
    Failed(#[from] UpstreamError),
}

/// Decides whether an error counts against the breaker's failure budget.
pub type FailurePredicate = Arc<dyn Fn(&UpstreamError) -> bool + Send + Sync>;

/// Default classification: cancellations and 4xx responses do not erode
/// the breaker; everything else does.
pub fn default_failure_predicate() -> FailurePredicate {
    Arc::new(|error: &UpstreamError| {
        !matches!(error, UpstreamError::Cancelled) && !error.is_client_error()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_predicate_excludes_cancellation_and_client_errors() {
        let predicate = default_failure_predicate();

        assert!(!predicate(&UpstreamError::Cancelled));
        assert!(!predicate(&UpstreamError::Status { code: 404 }));
        assert!(!predicate(&UpstreamError::Status { code: 422 }));

        assert!(predicate(&UpstreamError::Status { code: 500 }));
        assert!(predicate(&UpstreamError::Transport("connection reset".into())));
        assert!(predicate(&UpstreamError::Timeout {
            after: Duration::from_secs(30)
        }));
    }
}
