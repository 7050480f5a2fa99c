//! HTTP/WebSocket surface and process wiring
//!
//! Exposes the incident API contracts, the realtime upgrade endpoint and
//! composite health; owns the scheduler that supervises the detector and
//! periodic jobs, and the kickoff capability that bridges detection into
//! correlation, broadcast and investigation.

pub mod handlers;
pub mod kickoff;
pub mod probes;
pub mod scheduler;
pub mod server;
pub mod state;

pub use kickoff::CorrelationKickoff;
pub use scheduler::{AvailabilitySweep, Scheduler, SloRecalculator};
pub use server::Server;
pub use state::AppState;
