//! Operational HTTP subsystem.
//!
//! # Responsibilities
//! - Read-only introspection endpoints (health report, breaker snapshots)
//! - Rate-limit feedback header mapping for the embedding application
//!
//! # Design Decisions
//! - The ops surface never mutates breaker or limiter state
//! - Chat traffic does not flow through this server; it belongs to the
//!   embedding application

pub mod headers;
pub mod server;

pub use server::OpsServer;
