//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, liveness endpoint)
//!     → request.rs (add request ID)
//!     → proxy::Orchestrator (mirror to both backends)
//!     → response.rs (primary response verbatim, or generic 500)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
