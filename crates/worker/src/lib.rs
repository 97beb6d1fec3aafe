//! Background work for the analytics engine.
//!
//! - Aggregator (sharded, single-writer profile folds)
//! - Enrichment (device detection from user agents)
//! - Replay (profile rebuild from the event log)
//! - Scheduler (periodic metrics logging)

pub mod aggregator;
pub mod enrichment;
pub mod replay;
pub mod scheduler;

pub use aggregator::{Aggregator, AggregatorConfig, AggregatorHandle};
pub use enrichment::DeviceEnricher;
pub use replay::{ProfileRebuilder, RebuildSummary};
pub use scheduler::SchedulerConfig;
