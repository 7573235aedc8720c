//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Slack added on top of the header timeout for the transport budgets.
pub const SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// Root configuration for the mirroring proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Deployment environment name (dev, staging, prod...).
    pub environment: EnvironmentName,

    /// Listener configuration (bind host and port).
    pub listener: ListenerConfig,

    /// Primary and secondary backend definitions.
    pub backends: BackendsConfig,

    /// Timeout budgets.
    pub timeouts: TimeoutConfig,

    /// Request and response size limits.
    pub limits: LimitsConfig,

    /// Comparison policy.
    pub compare: CompareConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Environment name, defaulting to `dev`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EnvironmentName(pub String);

impl Default for EnvironmentName {
    fn default() -> Self {
        Self("dev".to_string())
    }
}

impl std::fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Port to listen on.
    pub port: u16,
}

impl ListenerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6060,
        }
    }
}

/// The two mirrored backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Base URL of the authoritative backend (e.g., "http://10.0.0.7:8080").
    pub primary_url: String,

    /// Base URL of the shadow backend.
    pub secondary_url: String,

    /// TCP connect timeout for backend calls in milliseconds.
    pub connect_timeout_ms: u64,

    /// Total time allowed for one backend call, body included, in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary_url: "http://127.0.0.1:8081".to_string(),
            secondary_url: "http://127.0.0.1:8082".to_string(),
            connect_timeout_ms: 1_000,
            call_timeout_ms: 30_000,
        }
    }
}

/// Timeout budgets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to read request headers, in milliseconds. The read and
    /// write budgets are derived from it.
    pub read_header_ms: u64,

    /// Grace period for in-flight requests after a shutdown signal, in seconds.
    pub shutdown_secs: u64,

    /// How long the comparator waits for the secondary after the primary
    /// settled, in milliseconds. Derived from the header budget when unset.
    pub comparison_ms: Option<u64>,
}

impl TimeoutConfig {
    pub fn read_header(&self) -> Duration {
        Duration::from_millis(self.read_header_ms)
    }

    /// Header budget with the safety margin applied.
    pub fn header_budget(&self) -> Duration {
        self.read_header() + SAFETY_MARGIN
    }

    /// Whole-request read/write budget: twice the header timeout plus margin.
    pub fn request_budget(&self) -> Duration {
        self.read_header() * 2 + SAFETY_MARGIN
    }

    pub fn comparison_timeout(&self) -> Duration {
        self.comparison_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.request_budget())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_header_ms: 2_000,
            shutdown_secs: 5,
            comparison_ms: None,
        }
    }
}

/// Size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound request body buffered for mirroring.
    pub max_request_body_bytes: usize,

    /// Maximum backend response body buffered per call.
    pub max_response_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_body_bytes: 2 * 1024 * 1024, // 2MB
            max_response_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Comparison policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Response headers excluded from header comparison (case-insensitive).
    pub ignored_headers: Vec<String>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            ignored_headers: ["date", "server", "x-request-id", "content-length", "etag", "last-modified"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
