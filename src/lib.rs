//! Traffic-mirroring reverse proxy library.
//!
//! Every inbound request is sent to a primary and a secondary backend. The
//! client only ever sees the primary's response; the secondary's response is
//! compared against it in the background.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::Orchestrator;
