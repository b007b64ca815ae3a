//! Resilience layer for upstream AI services.
//!
//! Decides, for every outbound call to a slow or unreliable upstream
//! (text generation, image generation), whether to attempt it, how long
//! to wait, when to fail fast, and when to probe recovery.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────┐
//!                        │                UPSTREAM GUARD                  │
//!                        │                                                │
//!    Inbound request     │  ┌──────────┐   ┌──────────┐   ┌────────────┐ │
//!    ────────────────────┼─▶│ security │──▶│resilience│──▶│ supervisor │ │
//!                        │  │rate limit│   │ breaker  │   │ stream+retry│ │
//!                        │  └──────────┘   └──────────┘   └─────┬──────┘ │
//!                        │                                      │        │
//!    Chunk stream        │                                      ▼        │
//!    ◀───────────────────┼──────────────────────────────  Upstream call  │
//!                        │                                                │
//!                        │  ┌──────────────────────────────────────────┐ │
//!                        │  │           Cross-Cutting Concerns          │ │
//!                        │  │  ┌────────┐ ┌────────┐ ┌───────────────┐ │ │
//!                        │  │  │ config │ │ health │ │ observability │ │ │
//!                        │  │  └────────┘ └────────┘ └───────────────┘ │ │
//!                        │  │  ┌───────────────┐  ┌──────────────────┐ │ │
//!                        │  │  │   lifecycle   │  │  http (ops view) │ │ │
//!                        │  │  └───────────────┘  └──────────────────┘ │ │
//!                        │  └──────────────────────────────────────────┘ │
//!                        └───────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod resilience;
pub mod security;

// Health and introspection
pub mod health;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::GuardConfig;
pub use health::aggregator::HealthAggregator;
pub use http::OpsServer;
pub use lifecycle::Shutdown;
pub use resilience::circuit_breaker::{Admission, CircuitBreaker, CircuitState};
pub use resilience::error::{CallError, UpstreamError};
pub use resilience::registry::BreakerRegistry;
pub use resilience::retries::RetryBudget;
pub use resilience::supervisor::{RequestSpec, StreamEvent, StreamHandle, Supervisor};
pub use security::rate_limit::{RateLimitDecision, TieredRateLimiter};
pub use security::sessions::SessionTracker;
