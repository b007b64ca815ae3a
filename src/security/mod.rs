//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → rate_limit.rs (fixed-window quota by category × tier)
//!     → sessions.rs (concurrent streaming-session cap by tier)
//!     → only then breaker admission and upstream I/O
//! ```
//!
//! # Design Decisions
//! - Admission decisions never perform I/O
//! - Every decision carries full feedback for response headers
//! - Buckets are per-identity; nothing is shared across identities

pub mod rate_limit;
pub mod sessions;
