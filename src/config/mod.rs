//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → optional config file (TOML) via loader.rs
//!     → SHADOW_PROXY_* environment overrides
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → values handed to the orchestrator and the HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    BackendsConfig, CompareConfig, LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    ProxyConfig, TimeoutConfig,
};
