//! Rule-driven incident detection
//!
//! Periodically evaluates threshold and pattern rules against the
//! telemetry adapters, deduplicates still-firing alerts in memory and
//! materializes new incidents with their first timeline entry.

pub mod detector;

pub use detector::{
    CorrelationTrigger, DetectionEvent, IncidentDetector, CORRELATION_DEADLINE,
    DEFAULT_DETECTION_INTERVAL,
};
