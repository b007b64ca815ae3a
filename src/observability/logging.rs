//! Structured logging.
//!
//! # Design Decisions
//! - Structured fields only; the core never renders user-facing text
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::schema::ObservabilityConfig;

/// Initialize the tracing subscriber once at startup.
pub fn init(config: &ObservabilityConfig) {
    let default_filter = format!("upstream_guard={},tower_http=warn", config.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
