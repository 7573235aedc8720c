//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Backend URLs must be usable upstream targets, and distinct
//! - Validate value ranges (timeouts > 0, limits > 0, known log level)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderName;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::proxy::backend::{BackendId, BackendTarget, TargetError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{backend} backend: {source}")]
    Backend {
        backend: BackendId,
        #[source]
        source: TargetError,
    },

    #[error("primary and secondary backends point at the same target {0}")]
    SameBackend(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("unknown log level '{0}'")]
    LogLevel(String),

    #[error("'{0}' is not a valid header name")]
    HeaderName(String),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let primary = BackendTarget::parse(&config.backends.primary_url);
    let secondary = BackendTarget::parse(&config.backends.secondary_url);
    match (&primary, &secondary) {
        (Ok(p), Ok(s)) if p == s => errors.push(ValidationError::SameBackend(p.to_string())),
        _ => {}
    }
    for (backend, parsed) in [(BackendId::Primary, primary), (BackendId::Secondary, secondary)] {
        if let Err(source) = parsed {
            errors.push(ValidationError::Backend { backend, source });
        }
    }

    let positive = [
        ("backends.connect_timeout_ms", config.backends.connect_timeout_ms),
        ("backends.call_timeout_ms", config.backends.call_timeout_ms),
        ("timeouts.read_header_ms", config.timeouts.read_header_ms),
        ("timeouts.comparison_ms", config.timeouts.comparison_ms.unwrap_or(1)),
        ("limits.max_response_body_bytes", config.limits.max_response_body_bytes as u64),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    for name in &config.compare.ignored_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::HeaderName(name.clone()));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(config.observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
