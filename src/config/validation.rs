//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, window geometry consistent)
//! - Detect duplicate dependency names and quota entries
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::GuardConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("dependency {0}: name is empty")]
    EmptyDependencyName(usize),

    #[error("dependency {0}: duplicate name")]
    DuplicateDependency(String),

    #[error("dependency {name}: invalid base_url: {reason}")]
    InvalidBaseUrl { name: String, reason: String },

    #[error("dependency {name}: {field} must be greater than zero")]
    ZeroThreshold { name: String, field: &'static str },

    #[error("dependency {name}: window_buckets ({buckets}) must divide window_size ({window_secs}s)")]
    WindowGeometry {
        name: String,
        buckets: u32,
        window_secs: u64,
    },

    #[error("dependency {name}: {field} must be within (0, 1]")]
    RateOutOfRange { name: String, field: &'static str },

    #[error("rate limit quota {0}: limit must be greater than zero")]
    ZeroQuotaLimit(usize),

    #[error("rate limit quota for ({category}, {tier}) is duplicated")]
    DuplicateQuota { category: String, tier: String },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen_names = HashSet::new();
    for (index, dependency) in config.dependencies.iter().enumerate() {
        if dependency.name.is_empty() {
            errors.push(ValidationError::EmptyDependencyName(index));
            continue;
        }
        if !seen_names.insert(dependency.name.clone()) {
            errors.push(ValidationError::DuplicateDependency(dependency.name.clone()));
        }
        if let Err(e) = Url::parse(&dependency.base_url) {
            errors.push(ValidationError::InvalidBaseUrl {
                name: dependency.name.clone(),
                reason: e.to_string(),
            });
        }

        let breaker = &dependency.breaker;
        for (value, field) in [
            (breaker.failure_threshold as u64, "failure_threshold"),
            (breaker.success_threshold as u64, "success_threshold"),
            (breaker.timeout_ms, "timeout_ms"),
            (breaker.window_size_secs, "window_size_secs"),
            (breaker.window_buckets as u64, "window_buckets"),
        ] {
            if value == 0 {
                errors.push(ValidationError::ZeroThreshold {
                    name: dependency.name.clone(),
                    field,
                });
            }
        }
        if breaker.window_buckets > 0
            && breaker.window_size_secs > 0
            && breaker.window_size_secs % breaker.window_buckets as u64 != 0
        {
            errors.push(ValidationError::WindowGeometry {
                name: dependency.name.clone(),
                buckets: breaker.window_buckets,
                window_secs: breaker.window_size_secs,
            });
        }
        for (value, field) in [
            (breaker.window_failure_rate, "window_failure_rate"),
            (breaker.slow_call_rate_threshold, "slow_call_rate_threshold"),
        ] {
            if value <= 0.0 || value > 1.0 {
                errors.push(ValidationError::RateOutOfRange {
                    name: dependency.name.clone(),
                    field,
                });
            }
        }
    }

    let mut seen_quotas = HashSet::new();
    for (index, quota) in config.rate_limit.quotas.iter().enumerate() {
        if quota.limit == 0 {
            errors.push(ValidationError::ZeroQuotaLimit(index));
        }
        if !seen_quotas.insert((quota.category.clone(), quota.tier.clone())) {
            errors.push(ValidationError::DuplicateQuota {
                category: quota.category.clone(),
                tier: quota.tier.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BreakerConfig, DependencyConfig, QuotaConfig};

    fn dependency(name: &str) -> DependencyConfig {
        DependencyConfig {
            name: name.to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            health_path: "/health".to_string(),
            fallback_message: None,
            breaker: BreakerConfig::default(),
        }
    }

    #[test]
    fn default_config_with_dependencies_validates() {
        let config = GuardConfig {
            dependencies: vec![dependency("text-gen"), dependency("image-gen")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors_not_just_the_first() {
        let mut bad = dependency("text-gen");
        bad.base_url = "not a url".to_string();
        bad.breaker.failure_threshold = 0;
        bad.breaker.window_failure_rate = 1.5;

        let config = GuardConfig {
            dependencies: vec![bad, dependency("text-gen")],
            ..Default::default()
        };

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 4);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateDependency(_))));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn rejects_window_geometry_mismatch() {
        let mut dep = dependency("text-gen");
        dep.breaker.window_size_secs = 60;
        dep.breaker.window_buckets = 7;

        let config = GuardConfig {
            dependencies: vec![dep],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::WindowGeometry { .. })));
    }

    #[test]
    fn rejects_duplicate_quota_entries() {
        let config = GuardConfig {
            rate_limit: crate::config::schema::RateLimitConfig {
                quotas: vec![
                    QuotaConfig::new("chat", "free", 30, 60),
                    QuotaConfig::new("chat", "free", 10, 60),
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateQuota {
                category: "chat".to_string(),
                tier: "free".to_string(),
            }]
        );
    }
}
