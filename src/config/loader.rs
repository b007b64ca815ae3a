//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GuardConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let toml = r#"
            [[dependencies]]
            name = "text-gen"
            base_url = "http://127.0.0.1:11434"

            [dependencies.breaker]
            failure_threshold = 3
            timeout_ms = 60000

            [[rate_limit.quotas]]
            category = "chat"
            tier = "free"
            limit = 30
            window_secs = 60
        "#;

        let config: GuardConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.dependencies.len(), 1);
        let dep = &config.dependencies[0];
        assert_eq!(dep.name, "text-gen");
        assert_eq!(dep.health_path, "/health");
        assert_eq!(dep.breaker.failure_threshold, 3);
        assert_eq!(dep.breaker.timeout_ms, 60_000);
        // Untouched fields keep defaults.
        assert_eq!(dep.breaker.window_buckets, 10);
        assert_eq!(config.rate_limit.quotas.len(), 1);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_invalid_config_with_all_errors() {
        let toml = r#"
            [[dependencies]]
            name = "text-gen"
            base_url = "::not-a-url::"

            [dependencies.breaker]
            failure_threshold = 0
        "#;

        let config: GuardConfig = toml::from_str(toml).unwrap();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
