//! Detection-to-correlation bridge
//!
//! The detector invokes this capability for every new incident. It
//! broadcasts the created incident, runs the correlation engine, pushes
//! the resulting correlations to operators and hands the incident to the
//! autonomous investigator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relops_correlation::CorrelationEngine;
use relops_detection::CorrelationTrigger;
use relops_investigation::AraOrchestrator;
use relops_realtime::RealtimeHub;
use relops_store::Gateway;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Namespace correlated incidents are scoped to
const DEFAULT_NAMESPACE: &str = "default";

pub struct CorrelationKickoff {
    store: Arc<dyn Gateway>,
    engine: Arc<CorrelationEngine>,
    investigator: Arc<AraOrchestrator>,
    hub: RealtimeHub,
}

impl CorrelationKickoff {
    pub fn new(
        store: Arc<dyn Gateway>,
        engine: Arc<CorrelationEngine>,
        investigator: Arc<AraOrchestrator>,
        hub: RealtimeHub,
    ) -> Self {
        Self {
            store,
            engine,
            investigator,
            hub,
        }
    }
}

#[async_trait]
impl CorrelationTrigger for CorrelationKickoff {
    async fn incident_detected(
        &self,
        incident_id: Uuid,
        service: String,
        timestamp: DateTime<Utc>,
    ) {
        info!("Triggering correlation for incident {incident_id} (service: {service})");

        match self.store.incident(incident_id).await {
            Ok(Some(incident)) => match serde_json::to_value(&incident) {
                Ok(payload) => self.hub.broadcast_incident_created(payload).await,
                Err(e) => warn!("Failed to encode incident {incident_id} for broadcast: {e}"),
            },
            Ok(None) => warn!("Incident {incident_id} not found for broadcast"),
            Err(e) => warn!("Failed to fetch incident {incident_id} for broadcast: {e}"),
        }

        match self
            .engine
            .correlate_incident(incident_id, &service, DEFAULT_NAMESPACE, timestamp)
            .await
        {
            Ok(ctx) => {
                if !ctx.correlations.is_empty() {
                    self.hub
                        .broadcast_correlation_found(json!({
                            "incident_id": incident_id,
                            "correlations": ctx.correlations,
                        }))
                        .await;
                }
            }
            Err(e) => warn!("Correlation failed for incident {incident_id}: {e}"),
        }

        // Investigation runs detached, after correlation completes
        self.investigator.clone().start_investigation(incident_id, service);
    }
}
