// src/utils/mod.rs
//! Common utilities shared across the engine
//!
//! - **Config**: Layered engine configuration (defaults, file, environment)
//! - **Errors**: Engine error type and crate-wide `Result` alias

pub mod config;
pub mod errors;

pub use self::config::{EngineConfig, ExecutionSettings, ObservabilitySettings, WatchdogSettings};
pub use self::errors::{EngineError, Result};
