//! Recovery action automation
//!
//! Given an incident's diagnosed root-cause type, generates a ranked,
//! confidence-scored list of candidate remediation actions, persists
//! them, and drives the approve/execute workflow. Suggestions are
//! rule-based: each root-cause class maps to a fixed catalog of actions.

pub mod catalog;
pub mod service;

pub use service::{RecoveryActionService, RecoverySuggestion};
