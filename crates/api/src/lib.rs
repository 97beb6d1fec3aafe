//! HTTP API layer for the analytics engine.
//!
//! `POST /analytics/track` ingests events; the remaining routes are
//! tenant-scoped reads over the event log and customer profiles.

pub mod extractors;
pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, IdentityClient};
