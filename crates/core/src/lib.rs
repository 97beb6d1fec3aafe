//! Core types, classification, aggregation pipeline and profile folding for
//! the widget analytics engine.

pub mod auth;
pub mod classify;
pub mod error;
pub mod events;
pub mod limits;
pub mod pipeline;
pub mod profile;
pub mod track;

pub use auth::{ApiKey, IdentityResolver, UserIdentity};
pub use classify::{classify, classify_raw};
pub use error::{Error, Result};
pub use events::*;
pub use pipeline::{Accumulator, Expr, Filter, Group, GroupKey, Pipeline, ScanHint, SortKey, Stage};
pub use profile::*;
pub use track::{RequestContext, TrackRequest};
