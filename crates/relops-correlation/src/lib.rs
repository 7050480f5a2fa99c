//! Correlation engine for the relops incident core
//!
//! Gathers evidence from the three telemetry sources under a bounded
//! worker pool, scores candidate root causes with a weighted model and
//! persists the resulting correlation set atomically.

pub mod engine;
pub mod scoring;

pub use engine::{CorrelationEngine, IncidentAnalysis, IncidentContext, WORKER_POOL_SIZE};
pub use scoring::{rank, Ranking};
