//! Autonomous investigation orchestrator (ARA)
//!
//! Runs a multi-phase evidence pipeline per incident as a detached task,
//! streaming each phase's findings to operators and synthesizing a
//! hypothesis with recommended next steps.

pub mod orchestrator;

pub use orchestrator::AraOrchestrator;
