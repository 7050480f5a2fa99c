//! Shared types and utilities for the relops incident core
//!
//! This crate provides the domain model, error type and configuration
//! used across all components of the system.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
