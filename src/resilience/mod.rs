//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to upstream:
//!     → registry.rs (look up the dependency's breaker)
//!     → circuit_breaker.rs (admission check, deadline, outcome recording)
//!     → supervisor.rs (stream consumption, cancellation, retries)
//!     → On transient failure: retries.rs + backoff.rs (budgeted retry)
//! ```
//!
//! # Design Decisions
//! - Every admitted call has a deadline; timeouts always count as failures
//! - Caller cancellation never counts against a breaker
//! - One breaker per dependency, owned by an explicit registry
//! - Window rotation is an injected concern, not a construction side effect

pub mod backoff;
pub mod circuit_breaker;
pub mod error;
pub mod registry;
pub mod retries;
pub mod supervisor;
pub mod window;
