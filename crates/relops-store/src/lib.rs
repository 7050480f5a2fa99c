//! Typed Postgres persistence gateway
//!
//! Capability traits for the entities the core persists (rules,
//! incidents, timeline events, correlations, recovery actions) and their
//! Postgres implementation on a shared connection pool. Consumers hold
//! trait objects so tests can substitute in-memory doubles.

pub mod correlations;
pub mod db;
pub mod incidents;
pub mod recovery;
pub mod rules;
pub mod timeline;
pub mod traits;

pub use db::connect;
pub use traits::{
    AnalysisStore, CorrelationStore, DetectionStore, Gateway, IncidentStore, RecoveryActionStore,
    RecoveryStore, RuleStore, TimelineStore,
};

use sqlx::PgPool;

/// Postgres-backed persistence gateway
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
