//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGHUP → shutdown requested
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → in-flight requests drain
//!     → forced stop after the configured grace period
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
