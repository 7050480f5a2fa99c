//! Per-connection read/write pumps
//!
//! An upgraded socket gets a hub registration and two pumps: the write
//! pump drains the client's outbound channel and keeps the connection
//! alive with periodic pings; the read pump enforces the idle deadline
//! (any inbound frame, pongs included, refreshes it) and the frame size
//! limit. Either pump ending unregisters the client.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::hub::{ClientHandle, RealtimeHub};

/// Keep-alive ping cadence; must stay under the read deadline
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Idle read deadline
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum inbound frame size in bytes
pub const MAX_FRAME_BYTES: usize = 512;

/// Serve one upgraded WebSocket until it disconnects
pub async fn serve_socket(socket: WebSocket, hub: RealtimeHub) {
    let (handle, mut outbound) = ClientHandle::new();
    let client_id = handle.id();
    hub.register(handle).await;

    let (mut sink, mut stream) = socket.split();

    let write_pump = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_PERIOD);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Swallow the interval's immediate first tick
        ping.tick().await;

        loop {
            tokio::select! {
                maybe = outbound.recv() => match maybe {
                    Some(envelope) => {
                        let text = match serde_json::to_string(&*envelope) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode envelope for client {client_id}: {e}");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // Hub closed the outbound (shutdown or slow-consumer drop)
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read pump on the connection task
    loop {
        match tokio::time::timeout(READ_TIMEOUT, stream.next()).await {
            Err(_) => {
                debug!("Client {client_id} read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("Client {client_id} socket error: {e}");
                break;
            }
            Ok(Some(Ok(message))) => match message {
                Message::Close(_) => break,
                Message::Text(text) if text.len() > MAX_FRAME_BYTES => {
                    warn!("Client {client_id} exceeded frame size limit, closing");
                    break;
                }
                Message::Binary(data) if data.len() > MAX_FRAME_BYTES => {
                    warn!("Client {client_id} exceeded frame size limit, closing");
                    break;
                }
                // Pongs and small frames just refresh the deadline
                _ => {}
            },
        }
    }

    hub.unregister(client_id).await;
    write_pump.abort();
}
