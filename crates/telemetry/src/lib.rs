//! Internal telemetry for the widget analytics engine.
//!
//! Structured logging via `tracing`, in-process metrics and a global
//! health registry for the storage backends.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
