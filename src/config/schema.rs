//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the resilience layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Operational endpoint listener (health/breaker introspection).
    pub listener: ListenerConfig,

    /// Upstream dependency definitions, one breaker each.
    pub dependencies: Vec<DependencyConfig>,

    /// Supervisor retry policy.
    pub retries: RetryConfig,

    /// Tiered rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Health probe cycle settings.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration for the operational HTTP endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8088").
    pub bind_address: String,

    /// Request timeout for operational endpoints in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8088".to_string(),
            request_timeout_secs: 5,
        }
    }
}

/// One upstream dependency (e.g., the text or image generation daemon).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependencyConfig {
    /// Unique dependency name ("text-gen", "image-gen").
    pub name: String,

    /// Base URL of the upstream service.
    pub base_url: String,

    /// Path probed by the health aggregator.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Static message streamed to callers when the circuit is open.
    #[serde(default)]
    pub fallback_message: Option<String>,

    /// Breaker tuning for this dependency.
    #[serde(default)]
    pub breaker: BreakerConfig,
}

fn default_health_path() -> String {
    "/health".to_string()
}

/// Circuit breaker tuning for one dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive qualifying failures that trip the circuit.
    pub failure_threshold: u32,

    /// Probe successes required to close from half-open; also the
    /// half-open concurrent probe bound.
    pub success_threshold: u32,

    /// Per-call deadline in milliseconds.
    pub timeout_ms: u64,

    /// Time spent open before the next admission check may probe.
    pub reset_timeout_ms: u64,

    /// Total rolling window duration in seconds.
    pub window_size_secs: u64,

    /// Number of ring buckets the window is divided into.
    pub window_buckets: u32,

    /// Calls slower than this count as slow regardless of outcome.
    pub slow_call_duration_ms: u64,

    /// Window slow-call rate that trips the circuit.
    pub slow_call_rate_threshold: f64,

    /// Window failure rate that trips the circuit. Independent safety net
    /// on top of `failure_threshold`.
    pub window_failure_rate: f64,

    /// Minimum window samples before either rate threshold applies.
    pub min_window_samples: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout_ms: 30_000,
            reset_timeout_ms: 30_000,
            window_size_secs: 60,
            window_buckets: 10,
            slow_call_duration_ms: 10_000,
            slow_call_rate_threshold: 0.8,
            window_failure_rate: 0.5,
            min_window_samples: 10,
        }
    }
}

/// Supervisor retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum retries after the initial attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Cap for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Fraction of recent requests that may be retries (retry budget).
    pub budget_ratio: f32,

    /// Retries always allowed regardless of ratio, so low-traffic
    /// periods can still recover.
    pub budget_min_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            budget_ratio: 0.1,
            budget_min_retries: 10,
        }
    }
}

/// Tiered rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Quota applied when no (category, tier) entry matches.
    pub default_limit: u32,

    /// Window for the default quota in seconds.
    pub default_window_secs: u64,

    /// Per (category, tier) quotas.
    pub quotas: Vec<QuotaConfig>,

    /// Concurrent streaming-session caps per tier.
    pub sessions: Vec<SessionCapConfig>,

    /// Session cap applied when no tier entry matches.
    pub default_max_sessions: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_limit: 60,
            default_window_secs: 60,
            quotas: vec![
                QuotaConfig::new("chat", "free", 30, 60),
                QuotaConfig::new("chat", "premium", 100, 60),
                QuotaConfig::new("image", "free", 5, 60),
                QuotaConfig::new("image", "premium", 20, 60),
            ],
            sessions: vec![
                SessionCapConfig {
                    tier: "free".to_string(),
                    max_sessions: 1,
                },
                SessionCapConfig {
                    tier: "premium".to_string(),
                    max_sessions: 5,
                },
            ],
            default_max_sessions: 1,
        }
    }
}

/// Quota for one (category, tier) pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaConfig {
    /// Request category ("chat", "image").
    pub category: String,

    /// Plan tier ("free", "premium").
    pub tier: String,

    /// Admissions allowed per window.
    pub limit: u32,

    /// Window duration in seconds.
    pub window_secs: u64,
}

impl QuotaConfig {
    pub fn new(category: &str, tier: &str, limit: u32, window_secs: u64) -> Self {
        Self {
            category: category.to_string(),
            tier: tier.to_string(),
            limit,
            window_secs,
        }
    }
}

/// Concurrent session cap for one tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionCapConfig {
    pub tier: String,
    pub max_sessions: usize,
}

/// Health probe cycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable the timer-driven probe cycle.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Cached records older than this report as unknown.
    pub record_ttl_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            record_ttl_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
