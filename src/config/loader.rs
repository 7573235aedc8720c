//! Configuration loading: defaults, optional TOML file, environment overrides.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::schema::{EnvironmentName, LogFormat, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "SHADOW_PROXY_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Env {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML config file. Missing fields take their defaults.
fn read_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Resolve the effective configuration: file (or defaults), then process
/// environment overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `SHADOW_PROXY_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| {
        let key = format!("{}{}", ENV_PREFIX, name);
        lookup(&key).map(|value| (key, value))
    };

    if let Some((key, value)) = var("PORT") {
        config.listener.port = parse(&key, &value)?;
    }
    if let Some((_, value)) = var("HOST") {
        config.listener.host = value;
    }
    if let Some((_, value)) = var("PRIMARY_URL") {
        config.backends.primary_url = value;
    }
    if let Some((_, value)) = var("SECONDARY_URL") {
        config.backends.secondary_url = value;
    }
    if let Some((key, value)) = var("CALL_TIMEOUT_MS") {
        config.backends.call_timeout_ms = parse(&key, &value)?;
    }
    if let Some((key, value)) = var("READ_HEADER_TIMEOUT_MS") {
        config.timeouts.read_header_ms = parse(&key, &value)?;
    }
    if let Some((key, value)) = var("SHUTDOWN_TIMEOUT_SECS") {
        config.timeouts.shutdown_secs = parse(&key, &value)?;
    }
    if let Some((key, value)) = var("COMPARISON_TIMEOUT_MS") {
        config.timeouts.comparison_ms = Some(parse(&key, &value)?);
    }
    if let Some((key, value)) = var("MAX_BODY_BYTES") {
        config.limits.max_request_body_bytes = parse(&key, &value)?;
    }
    if let Some((_, value)) = var("LOG_LEVEL") {
        config.observability.log_level = value;
    }
    if let Some((key, value)) = var("LOG_FORMAT") {
        config.observability.log_format = match value.to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => {
                return Err(ConfigError::Env {
                    key,
                    value,
                    reason: "expected 'pretty' or 'json'".to_string(),
                })
            }
        };
    }
    if let Some((_, value)) = var("ENVIRONMENT") {
        config.environment = EnvironmentName(value);
    }

    Ok(())
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
