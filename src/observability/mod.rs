//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Call IDs flow through supervisor log fields for correlation
//! - Metric updates are cheap (atomic increments)
//! - The core emits typed outcomes; rendering belongs to callers

pub mod logging;
pub mod metrics;
