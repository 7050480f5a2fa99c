//! Kubernetes-compatible cluster adapter
//!
//! Pod, deployment and event reads plus the two recovery verbs (rollout
//! restart, scale). Built on the cluster API client; when no cluster
//! configuration can be inferred at startup the whole capability is held
//! as [`crate::ClusterAccess::Disabled`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use relops_common::{Error, Result};
use relops_stability::{CircuitBreaker, HealthState};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::{ClusterAccess, ClusterAdapter, ClusterEvent, ClusterSummary, DeploymentState, PodState};

/// Adapter over the Kubernetes API server
pub struct KubeAdapter {
    client: Client,
    breaker: Arc<CircuitBreaker>,
}

impl KubeAdapter {
    pub fn new(client: Client, breaker: Arc<CircuitBreaker>) -> Self {
        Self { client, breaker }
    }

    /// Try to infer cluster access from the environment. Failure to find
    /// a configuration disables cluster features rather than failing
    /// startup.
    pub async fn detect(breaker: Arc<CircuitBreaker>) -> ClusterAccess {
        match Client::try_default().await {
            Ok(client) => ClusterAccess::Enabled(Arc::new(KubeAdapter::new(client, breaker))),
            Err(e) => {
                warn!("Cluster access disabled, no usable configuration: {e}");
                ClusterAccess::Disabled
            }
        }
    }

    fn record<T>(&self, result: std::result::Result<T, kube::Error>) -> Result<T> {
        match result {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(map_kube_error(e))
            }
        }
    }

    fn ensure_admitted(&self) -> Result<()> {
        if self.breaker.can_execute() {
            Ok(())
        } else {
            Err(Error::Unavailable(format!(
                "circuit breaker '{}' is open",
                self.breaker.name()
            )))
        }
    }
}

fn map_kube_error(err: kube::Error) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 404 => {
            Error::NotFound(format!("cluster object not found: {}", response.message))
        }
        kube::Error::Api(response) if response.code >= 500 => {
            Error::Upstream(format!("api server returned {}: {}", response.code, response.message))
        }
        kube::Error::Api(response) => {
            Error::Adapter(format!("api server returned {}: {}", response.code, response.message))
        }
        other => Error::Unreachable(format!("cluster api unreachable: {other}")),
    }
}

/// Whether a pod matches a service filter; "all" and the empty string
/// disable filtering
fn matches_service(name: &str, labels: Option<&std::collections::BTreeMap<String, String>>, service: &str) -> bool {
    if service.is_empty() || service == "all" {
        return true;
    }
    if name.contains(service) {
        return true;
    }
    labels
        .and_then(|l| l.get("app"))
        .map(|app| app == service)
        .unwrap_or(false)
}

fn pod_state(pod: &Pod) -> PodState {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();

    let mut status = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let mut restarts = 0;
    let mut last_restart: Option<DateTime<Utc>> = None;

    if let Some(container_statuses) = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
    {
        for cs in container_statuses {
            restarts += cs.restart_count;
            // A waiting reason like CrashLoopBackOff is more useful than
            // the phase, which stays Running while containers flap
            if let Some(reason) = cs
                .state
                .as_ref()
                .and_then(|state| state.waiting.as_ref())
                .and_then(|waiting| waiting.reason.clone())
            {
                status = reason;
            }
            if let Some(finished) = cs
                .last_state
                .as_ref()
                .and_then(|state| state.terminated.as_ref())
                .and_then(|terminated| terminated.finished_at.as_ref())
            {
                let at = finished.0;
                if last_restart.map(|prev| at > prev).unwrap_or(true) {
                    last_restart = Some(at);
                }
            }
        }
    }

    PodState {
        name,
        namespace,
        status,
        restarts,
        last_restart,
    }
}

#[async_trait]
impl ClusterAdapter for KubeAdapter {
    async fn pods(&self, namespace: &str, service: &str) -> Result<Vec<PodState>> {
        self.ensure_admitted()?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = self.record(api.list(&ListParams::default()).await)?;

        Ok(list
            .items
            .iter()
            .filter(|pod| {
                matches_service(
                    pod.metadata.name.as_deref().unwrap_or(""),
                    pod.metadata.labels.as_ref(),
                    service,
                )
            })
            .map(pod_state)
            .collect())
    }

    async fn deployments(&self, namespace: &str, service: &str) -> Result<Vec<DeploymentState>> {
        self.ensure_admitted()?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = self.record(api.list(&ListParams::default()).await)?;

        Ok(list
            .items
            .iter()
            .filter(|d| {
                matches_service(
                    d.metadata.name.as_deref().unwrap_or(""),
                    d.metadata.labels.as_ref(),
                    service,
                )
            })
            .map(|d| DeploymentState {
                name: d.metadata.name.clone().unwrap_or_default(),
                namespace: d.metadata.namespace.clone().unwrap_or_default(),
                desired_replicas: d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0),
                ready_replicas: d
                    .status
                    .as_ref()
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or(0),
            })
            .collect())
    }

    async fn events(
        &self,
        namespace: &str,
        service: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClusterEvent>> {
        self.ensure_admitted()?;
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let list = self.record(api.list(&ListParams::default()).await)?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|event| {
                let object = event.involved_object.name.clone().unwrap_or_default();
                if !matches_service(&object, None, service) {
                    return None;
                }
                let last_seen = event.last_timestamp.as_ref().map(|t| t.0);
                if let Some(at) = last_seen {
                    if at < since {
                        return None;
                    }
                }
                Some(ClusterEvent {
                    reason: event.reason.unwrap_or_default(),
                    message: event.message.unwrap_or_default(),
                    object,
                    namespace: event.metadata.namespace.clone().unwrap_or_default(),
                    event_type: event.type_.unwrap_or_default(),
                    last_seen,
                })
            })
            .collect())
    }

    async fn restart_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        self.ensure_admitted()?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            "kubectl.kubernetes.io/restartedAt": Utc::now().to_rfc3339()
                        }
                    }
                }
            }
        });
        self.record(
            api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await,
        )?;
        Ok(())
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        self.ensure_admitted()?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        self.record(
            api.patch_scale(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await,
        )?;
        Ok(())
    }

    async fn cluster_status(&self) -> Result<ClusterSummary> {
        self.ensure_admitted()?;
        let api: Api<Pod> = Api::all(self.client.clone());
        let list = self.record(api.list(&ListParams::default()).await)?;

        let pods: Vec<PodState> = list.items.iter().map(pod_state).collect();
        let running = pods.iter().filter(|p| p.status == "Running").count();
        let failed = pods.iter().filter(|p| p.status == "Failed").count();
        let pending = pods.iter().filter(|p| p.status == "Pending").count();

        Ok(ClusterSummary {
            total_pods: pods.len(),
            running_pods: running,
            failed_pods: failed,
            pending_pods: pending,
            pods,
            last_check: Utc::now(),
        })
    }

    async fn health(&self) -> Result<HealthState> {
        match self.client.apiserver_version().await {
            Ok(_) => Ok(HealthState::Healthy),
            Err(e) => Err(map_kube_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_filter_accepts_wildcards_and_substrings() {
        assert!(matches_service("payment-service-abc123", None, "all"));
        assert!(matches_service("payment-service-abc123", None, ""));
        assert!(matches_service("payment-service-abc123", None, "payment-service"));
        assert!(!matches_service("user-service-xyz", None, "payment-service"));

        let mut labels = std::collections::BTreeMap::new();
        labels.insert("app".to_string(), "payment-service".to_string());
        assert!(matches_service("pod-xyz", Some(&labels), "payment-service"));
    }

    #[test]
    fn pod_state_prefers_waiting_reason() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "payment-service-abc", "namespace": "default" },
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app",
                    "ready": false,
                    "restartCount": 7,
                    "image": "app:latest",
                    "imageID": "",
                    "state": { "waiting": { "reason": "CrashLoopBackOff" } }
                }]
            }
        }))
        .unwrap();

        let state = pod_state(&pod);
        assert_eq!(state.status, "CrashLoopBackOff");
        assert_eq!(state.restarts, 7);
    }
}
