//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build registry/limiter/aggregator
//!     → Spawn background tasks → Serve ops endpoint
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → tasks drain and exit
//!
//! Signals (signals.rs):
//!     SIGTERM / ctrl-c → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Every background task owns a shutdown receiver; none is detached

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
