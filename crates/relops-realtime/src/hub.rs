//! Broadcast hub
//!
//! All mutation of the client set happens on one event-loop task fed by a
//! command channel; registration, unregistration and fan-out are messages
//! to that loop, never shared-state writes. Fan-out uses non-blocking
//! sends: a full outbound means a slow consumer, which is closed and
//! unregistered on the spot.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-client outbound channel capacity
pub const OUTBOUND_CAPACITY: usize = 256;

/// Inbound command channel capacity
const COMMAND_CAPACITY: usize = 256;

/// Event types delivered to operator UIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IncidentCreated,
    IncidentUpdated,
    CorrelationFound,
    TimelineEvent,
    AraLog,
    Alert,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::IncidentCreated => "incident_created",
            EventKind::IncidentUpdated => "incident_updated",
            EventKind::CorrelationFound => "correlation_found",
            EventKind::TimelineEvent => "timeline_event",
            EventKind::AraLog => "ara_log",
            EventKind::Alert => "alert",
        };
        f.write_str(s)
    }
}

/// Wire envelope pushed to every connected client
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: Value,
    /// Unix seconds
    pub timestamp: i64,
}

/// Hub-side handle for one connected client
pub struct ClientHandle {
    id: Uuid,
    outbound: mpsc::Sender<Arc<Envelope>>,
}

impl ClientHandle {
    /// Create a handle and the receiving half its socket pumps drain
    pub fn new() -> (Self, mpsc::Receiver<Arc<Envelope>>) {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Arc<Envelope>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: Uuid::new_v4(),
                outbound: tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

enum Command {
    Register(ClientHandle),
    Unregister(Uuid),
    Broadcast(Envelope),
    Shutdown,
}

/// Single-writer WebSocket fan-out
#[derive(Clone)]
pub struct RealtimeHub {
    commands: mpsc::Sender<Command>,
    client_count: Arc<AtomicUsize>,
}

impl RealtimeHub {
    /// Create the hub and start its event loop
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let client_count = Arc::new(AtomicUsize::new(0));
        tokio::spawn(event_loop(rx, client_count.clone()));
        Self {
            commands: tx,
            client_count,
        }
    }

    /// Register a connected client
    pub async fn register(&self, client: ClientHandle) {
        let _ = self.commands.send(Command::Register(client)).await;
    }

    /// Unregister a client by id; dropping its handle closes the outbound
    pub async fn unregister(&self, id: Uuid) {
        let _ = self.commands.send(Command::Unregister(id)).await;
    }

    /// Enqueue an event for fan-out to all connected clients
    pub async fn broadcast(&self, kind: EventKind, payload: Value) {
        let envelope = Envelope {
            kind,
            payload,
            timestamp: Utc::now().timestamp(),
        };
        if self.commands.send(Command::Broadcast(envelope)).await.is_err() {
            warn!("Broadcast dropped, hub event loop is gone");
        }
    }

    pub async fn broadcast_incident_created(&self, incident: Value) {
        self.broadcast(EventKind::IncidentCreated, incident).await;
    }

    pub async fn broadcast_incident_updated(&self, incident: Value) {
        self.broadcast(EventKind::IncidentUpdated, incident).await;
    }

    pub async fn broadcast_correlation_found(&self, data: Value) {
        self.broadcast(EventKind::CorrelationFound, data).await;
    }

    pub async fn broadcast_timeline_event(&self, event: Value) {
        self.broadcast(EventKind::TimelineEvent, event).await;
    }

    pub async fn broadcast_ara_log(&self, entry: Value) {
        self.broadcast(EventKind::AraLog, entry).await;
    }

    pub async fn broadcast_alert(&self, alert: Value) {
        self.broadcast(EventKind::Alert, alert).await;
    }

    /// Number of currently connected clients
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Close all client outbounds and stop the event loop
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

async fn event_loop(mut commands: mpsc::Receiver<Command>, client_count: Arc<AtomicUsize>) {
    let mut clients: HashMap<Uuid, ClientHandle> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register(client) => {
                debug!("Client {} connected", client.id);
                clients.insert(client.id, client);
                client_count.store(clients.len(), Ordering::Relaxed);
                info!("Client connected. Total: {}", clients.len());
            }
            Command::Unregister(id) => {
                if clients.remove(&id).is_some() {
                    client_count.store(clients.len(), Ordering::Relaxed);
                    info!("Client disconnected. Total: {}", clients.len());
                }
            }
            Command::Broadcast(envelope) => {
                let shared = Arc::new(envelope);
                let mut slow: Vec<Uuid> = Vec::new();
                for (id, client) in &clients {
                    match client.outbound.try_send(shared.clone()) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("Client {id} outbound full, dropping slow consumer");
                            slow.push(*id);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            slow.push(*id);
                        }
                    }
                }
                for id in slow {
                    clients.remove(&id);
                }
                client_count.store(clients.len(), Ordering::Relaxed);
            }
            Command::Shutdown => {
                info!("Hub shutting down, closing {} clients", clients.len());
                clients.clear();
                client_count.store(0, Ordering::Relaxed);
                break;
            }
        }
    }
}
