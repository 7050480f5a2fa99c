//! Shared application state for handlers

use relops_adapters::{ClusterAccess, MetricsAdapter};
use relops_correlation::CorrelationEngine;
use relops_detection::{CorrelationTrigger, IncidentDetector};
use relops_realtime::RealtimeHub;
use relops_recovery::RecoveryActionService;
use relops_stability::{BreakerRegistry, HealthAggregator};
use relops_store::Gateway;
use std::sync::Arc;

/// State shared across all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Gateway>,
    pub engine: Arc<CorrelationEngine>,
    pub detector: Arc<IncidentDetector>,
    pub metrics: Arc<dyn MetricsAdapter>,
    pub cluster: ClusterAccess,
    pub recovery: Arc<RecoveryActionService>,
    pub trigger: Arc<dyn CorrelationTrigger>,
    pub hub: RealtimeHub,
    pub health: Arc<HealthAggregator>,
    pub breakers: Arc<BreakerRegistry>,
}
