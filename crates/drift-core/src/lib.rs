//! Drift Core - Shared foundations for the Drift scanner
//!
//! This crate provides the error types, configuration loading and tracing
//! setup used by the scan orchestration crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{ConfigError, DriftError, Result};
pub use logging::init_tracing;
