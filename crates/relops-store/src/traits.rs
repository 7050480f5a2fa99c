//! Persistence gateway capability traits
//!
//! Split along consumer lines: the detector needs rules, incidents and
//! timeline; the correlation engine needs incidents and correlations;
//! the investigator only appends timeline entries. Blanket composites
//! let a single backing store serve every consumer as a trait object.

use async_trait::async_trait;
use relops_common::{
    Correlation, Incident, IncidentPatch, NewCorrelation, NewIncident, NewRecoveryAction,
    NewTimelineEvent, DetectionRule, RecoveryAction, RecoveryActionStatus, Result, Service,
    ServiceId, TimelineEvent,
};
use uuid::Uuid;

/// Detection-rule reads
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All enabled rules; loaded on every detection cycle so edits take
    /// effect by the next tick
    async fn enabled_rules(&self) -> Result<Vec<DetectionRule>>;
}

/// Incident and service writes/reads
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Create the service on first reference, or mark it degraded;
    /// returns its id
    async fn upsert_service_degraded(&self, name: &str) -> Result<ServiceId>;

    async fn services(&self) -> Result<Vec<Service>>;

    async fn create_incident(&self, new: NewIncident) -> Result<Incident>;

    async fn incident(&self, id: Uuid) -> Result<Option<Incident>>;

    /// Newest-first page of incidents
    async fn incidents(&self, limit: i64, offset: i64) -> Result<Vec<Incident>>;

    /// Incidents whose status is not resolved
    async fn active_incidents(&self) -> Result<Vec<Incident>>;

    /// Apply a partial update; a transition to resolved sets
    /// `resolved_at`, any other status clears it
    async fn update_incident(&self, id: Uuid, patch: IncidentPatch) -> Result<Option<Incident>>;
}

/// Append-only incident timeline
#[async_trait]
pub trait TimelineStore: Send + Sync {
    async fn append_timeline_event(&self, event: NewTimelineEvent) -> Result<TimelineEvent>;

    /// Timeline rows ordered by event time ascending
    async fn timeline(&self, incident_id: Uuid) -> Result<Vec<TimelineEvent>>;
}

/// Correlation rows, replaced atomically per incident
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Delete existing rows for the incident and insert the new set in a
    /// single transaction; readers never observe a partial set
    async fn replace_correlations(
        &self,
        incident_id: Uuid,
        rows: &[NewCorrelation],
    ) -> Result<Vec<Correlation>>;

    async fn correlations(&self, incident_id: Uuid) -> Result<Vec<Correlation>>;
}

/// Recovery-action suggestions and their approval/execution audit trail
#[async_trait]
pub trait RecoveryActionStore: Send + Sync {
    /// Persist a batch of suggested actions for an incident
    async fn insert_recovery_actions(
        &self,
        incident_id: Uuid,
        rows: &[NewRecoveryAction],
    ) -> Result<Vec<RecoveryAction>>;

    /// Actions for an incident, highest priority and confidence first
    async fn recovery_actions(&self, incident_id: Uuid) -> Result<Vec<RecoveryAction>>;

    async fn recovery_action(&self, action_id: Uuid) -> Result<Option<RecoveryAction>>;

    /// Mark an action approved; returns the updated row, None if unknown
    async fn approve_recovery_action(
        &self,
        action_id: Uuid,
        approved_by: &str,
    ) -> Result<Option<RecoveryAction>>;

    /// Record the outcome of an execution attempt
    async fn record_recovery_execution(
        &self,
        action_id: Uuid,
        status: RecoveryActionStatus,
        executed_by: &str,
        result: &str,
    ) -> Result<()>;
}

/// Everything the detector persists through
pub trait DetectionStore: RuleStore + IncidentStore + TimelineStore {}
impl<T: RuleStore + IncidentStore + TimelineStore + ?Sized> DetectionStore for T {}

/// Everything the correlation engine persists through
pub trait AnalysisStore: IncidentStore + CorrelationStore {}
impl<T: IncidentStore + CorrelationStore + ?Sized> AnalysisStore for T {}

/// Everything the recovery planner persists through
pub trait RecoveryStore: IncidentStore + CorrelationStore + RecoveryActionStore {}
impl<T: IncidentStore + CorrelationStore + RecoveryActionStore + ?Sized> RecoveryStore for T {}

/// The full gateway, as the API surface consumes it
pub trait Gateway:
    RuleStore + IncidentStore + TimelineStore + CorrelationStore + RecoveryActionStore
{
}
impl<T: RuleStore + IncidentStore + TimelineStore + CorrelationStore + RecoveryActionStore + ?Sized>
    Gateway for T
{
}
