//! HTTP handlers for the incident API
//!
//! Contracts consumed by the operator UI. Internal errors map onto a
//! uniform `{status, code, error, timestamp}` body with the appropriate
//! HTTP status.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use relops_common::{Error, Incident, IncidentPatch, NewIncident, Severity, TimelineEvent};
use relops_realtime::serve_socket;
use relops_stability::HealthState;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Default and maximum page sizes for incident listing
const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

/// Default SLO window for the availability read endpoint
const DEFAULT_AVAILABILITY_WINDOW_DAYS: u32 = 30;

/// API error response carrying a machine-readable code
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_FAILED",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                code: "NOT_FOUND",
                message: err.to_string(),
            },
            Error::InvalidQuery(_) | Error::Validation(_) | Error::Configuration(_) => Self {
                status: StatusCode::BAD_REQUEST,
                code: "VALIDATION_FAILED",
                message: err.to_string(),
            },
            Error::Unavailable(_) | Error::Unreachable(_) | Error::Timeout(_) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "DEPENDENCY_DOWN",
                message: err.to_string(),
            },
            _ => {
                warn!("Internal error surfaced to API: {err}");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "INTERNAL",
                    message: err.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "error",
            "code": self.code,
            "error": self.message,
            "timestamp": Utc::now(),
        });
        (self.status, Json(body)).into_response()
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(system_health))
        .route("/api/incidents", get(list_incidents).post(create_incident))
        .route("/api/incidents/active", get(active_incidents))
        .route("/api/incidents/:id", get(get_incident).patch(patch_incident))
        .route("/api/incidents/:id/timeline", get(incident_timeline))
        .route("/api/incidents/:id/correlations", get(incident_correlations))
        .route("/api/incidents/:id/analysis", get(incident_analysis))
        .route("/api/incidents/:id/recovery-actions", get(incident_recovery_actions))
        .route(
            "/api/incidents/:id/recovery-actions/suggest",
            axum::routing::post(suggest_recovery_actions),
        )
        .route(
            "/api/recovery-actions/:action_id/approve",
            axum::routing::post(approve_recovery_action),
        )
        .route(
            "/api/recovery-actions/:action_id/execute",
            axum::routing::post(execute_recovery_action),
        )
        .route("/api/detection/status", get(detection_status))
        .route("/api/stability/breakers", get(breaker_status))
        .route("/api/services", get(list_services))
        .route("/api/kubernetes/status", get(cluster_status))
        .route("/api/kubernetes/pods/:namespace/:service", get(cluster_pods))
        .route("/api/kubernetes/deployments/:namespace/:service", get(cluster_deployments))
        .route("/api/kubernetes/events/:namespace/:service", get(cluster_events))
        .route(
            "/api/kubernetes/deployments/:namespace/:service/restart",
            axum::routing::post(restart_deployment),
        )
        .route(
            "/api/kubernetes/deployments/:namespace/:service/scale",
            axum::routing::post(scale_deployment),
        )
        .route("/api/metrics/availability/:service", get(service_availability))
        .route("/api/metrics/error-rate/:service", get(service_error_rate))
        .route("/api/metrics/latency/:service", get(service_latency))
        .route("/api/realtime", get(realtime_upgrade))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct Pagination {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = page.offset.unwrap_or(0).max(0);
    Ok(Json(state.store.incidents(limit, offset).await?))
}

async fn active_incidents(
    State(state): State<AppState>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    Ok(Json(state.store.active_incidents().await?))
}

#[derive(Debug, Deserialize)]
struct CreateIncidentRequest {
    title: String,
    #[serde(default)]
    description: String,
    severity: Severity,
    service: String,
}

async fn create_incident(
    State(state): State<AppState>,
    Json(request): Json<CreateIncidentRequest>,
) -> Result<(StatusCode, Json<Incident>), ApiError> {
    if request.title.trim().is_empty() {
        return Err(ApiError::validation("title must not be empty"));
    }
    if request.service.trim().is_empty() {
        return Err(ApiError::validation("service must not be empty"));
    }

    let service_id = state
        .store
        .upsert_service_degraded(request.service.trim())
        .await?;
    let started_at = Utc::now();
    let incident = state
        .store
        .create_incident(NewIncident {
            title: request.title,
            description: request.description,
            severity: request.severity,
            service_id: Some(service_id),
            started_at,
        })
        .await?;

    // Correlation runs off the request path, like detector-created incidents
    let trigger = state.trigger.clone();
    let incident_id = incident.id;
    let service = request.service.trim().to_string();
    tokio::spawn(async move {
        if tokio::time::timeout(
            relops_detection::CORRELATION_DEADLINE,
            trigger.incident_detected(incident_id, service, started_at),
        )
        .await
        .is_err()
        {
            warn!("Correlation kickoff for incident {incident_id} hit its deadline");
        }
    });

    Ok((StatusCode::CREATED, Json(incident)))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Incident>, ApiError> {
    state
        .store
        .incident(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("incident {id}")))
}

async fn patch_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<IncidentPatch>,
) -> Result<Json<Incident>, ApiError> {
    let updated = state
        .store
        .update_incident(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("incident {id}")))?;

    match serde_json::to_value(&updated) {
        Ok(payload) => state.hub.broadcast_incident_updated(payload).await,
        Err(e) => warn!("Failed to encode incident {id} for broadcast: {e}"),
    }
    Ok(Json(updated))
}

async fn incident_timeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimelineEvent>>, ApiError> {
    Ok(Json(state.store.timeline(id).await?))
}

async fn incident_correlations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<relops_common::Correlation>>, ApiError> {
    Ok(Json(state.store.correlations(id).await?))
}

async fn incident_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<relops_correlation::IncidentAnalysis>, ApiError> {
    Ok(Json(state.engine.incident_analysis(id).await?))
}

async fn incident_recovery_actions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actions = state.recovery.actions_for(id).await?;
    Ok(Json(json!({
        "incident_id": id,
        "count": actions.len(),
        "actions": actions,
    })))
}

async fn suggest_recovery_actions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<relops_recovery::RecoverySuggestion>), ApiError> {
    let suggestion = state.recovery.suggest_actions(id).await?;
    Ok((StatusCode::CREATED, Json(suggestion)))
}

#[derive(Debug, Deserialize)]
struct ApproveActionRequest {
    approved_by: String,
}

async fn approve_recovery_action(
    State(state): State<AppState>,
    Path(action_id): Path<Uuid>,
    Json(request): Json<ApproveActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.approved_by.trim().is_empty() {
        return Err(ApiError::validation("approved_by must not be empty"));
    }
    let action = state
        .recovery
        .approve(action_id, request.approved_by.trim())
        .await?;
    Ok(Json(json!({
        "action_id": action.id,
        "status": action.status,
        "message": "Recovery action approved",
    })))
}

#[derive(Debug, Deserialize)]
struct ExecuteActionRequest {
    executed_by: String,
}

async fn execute_recovery_action(
    State(state): State<AppState>,
    Path(action_id): Path<Uuid>,
    Json(request): Json<ExecuteActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.executed_by.trim().is_empty() {
        return Err(ApiError::validation("executed_by must not be empty"));
    }
    let action = state
        .recovery
        .execute(action_id, request.executed_by.trim())
        .await?;
    Ok(Json(json!({
        "action_id": action.id,
        "status": action.status,
        "result": action.result,
        "message": "Recovery action executed successfully",
    })))
}

async fn detection_status(State(state): State<AppState>) -> impl IntoResponse {
    let alerts = state.detector.active_alerts().await;
    Json(json!({
        "status": "running",
        "active_alerts": alerts,
    }))
}

async fn breaker_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "breakers": state.breakers.status(),
        "availability": state.breakers.availability(),
    }))
}

async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<Vec<relops_common::Service>>, ApiError> {
    Ok(Json(state.store.services().await?))
}

/// Resolve the cluster adapter or surface the disabled state as 503
fn cluster_adapter(
    state: &AppState,
) -> Result<&std::sync::Arc<dyn relops_adapters::ClusterAdapter>, ApiError> {
    state
        .cluster
        .adapter()
        .ok_or_else(|| ApiError::from(Error::Unavailable("cluster integration not configured".to_string())))
}

async fn cluster_status(
    State(state): State<AppState>,
) -> Result<Json<relops_adapters::ClusterSummary>, ApiError> {
    Ok(Json(cluster_adapter(&state)?.cluster_status().await?))
}

async fn cluster_pods(
    State(state): State<AppState>,
    Path((namespace, service)): Path<(String, String)>,
) -> Result<Json<Vec<relops_adapters::PodState>>, ApiError> {
    Ok(Json(cluster_adapter(&state)?.pods(&namespace, &service).await?))
}

async fn cluster_deployments(
    State(state): State<AppState>,
    Path((namespace, service)): Path<(String, String)>,
) -> Result<Json<Vec<relops_adapters::DeploymentState>>, ApiError> {
    Ok(Json(
        cluster_adapter(&state)?.deployments(&namespace, &service).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    since_minutes: Option<i64>,
}

async fn cluster_events(
    State(state): State<AppState>,
    Path((namespace, service)): Path<(String, String)>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<relops_adapters::ClusterEvent>>, ApiError> {
    let since = Utc::now() - chrono::Duration::minutes(query.since_minutes.unwrap_or(60).max(0));
    Ok(Json(
        cluster_adapter(&state)?.events(&namespace, &service, since).await?,
    ))
}

async fn restart_deployment(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    cluster_adapter(&state)?.restart_deployment(&namespace, &name).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("rollout restart initiated for deployment {name}"),
        "timestamp": Utc::now(),
    })))
}

#[derive(Debug, Deserialize)]
struct ScaleRequest {
    replicas: i32,
}

async fn scale_deployment(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(request): Json<ScaleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.replicas < 0 {
        return Err(ApiError::validation("replicas must not be negative"));
    }
    cluster_adapter(&state)?
        .scale_deployment(&namespace, &name, request.replicas)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("deployment {name} scaled to {} replicas", request.replicas),
        "timestamp": Utc::now(),
    })))
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    window_days: Option<u32>,
}

async fn service_availability(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let window_days = query.window_days.unwrap_or(DEFAULT_AVAILABILITY_WINDOW_DAYS);
    let availability = state.metrics.availability(&service, window_days).await?;
    Ok(Json(json!({
        "service": service,
        "window_days": window_days,
        "availability_percent": availability,
    })))
}

async fn service_error_rate(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let error_rate = state.metrics.error_rate(&service).await?;
    Ok(Json(json!({
        "service": service,
        "error_rate_percent": error_rate,
    })))
}

async fn service_latency(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let latency = state.metrics.latency_p95(&service).await?;
    Ok(Json(json!({
        "service": service,
        "latency_p95_ms": latency,
    })))
}

async fn system_health(State(state): State<AppState>) -> Response {
    let health = state.health.check().await;
    let status = match health.status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(health)).into_response()
}

async fn realtime_upgrade(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let hub = state.hub.clone();
    upgrade.on_upgrade(move |socket| serve_socket(socket, hub))
}
