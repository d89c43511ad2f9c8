//! Enrichment scheduler and progress reporting.
//!
//! See [`engine::EnrichEngine`] for the fan-out/fan-in design and
//! [`progress::ProgressReporter`] for the periodic counters.

mod engine;
mod progress;

pub use engine::{EngineError, EnrichEngine, EnrichError, VERSION_FANOUT_LIMIT};
pub use progress::ProgressReporter;
