//! Real-time incident updates over WebSocket
//!
//! A single-writer fan-out hub: one event loop owns the connected-client
//! set, and per-client bounded outbound channels absorb bursts. A client
//! whose outbound fills up is dropped within the same fan-out.

pub mod hub;
pub mod socket;

pub use hub::{ClientHandle, Envelope, EventKind, RealtimeHub, OUTBOUND_CAPACITY};
pub use socket::serve_socket;
