// src/utils/errors.rs
//! Engine error type
//!
//! Only validation failures (and engine lifecycle failures) are returned to
//! callers as errors. Everything an agent does wrong is converted into a failed
//! `ExecutionResult` by the executor instead.

use thiserror::Error;

/// Errors surfaced by the engine API
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed execution context (empty fields, bad values)
    #[error("Invalid execution context: {0}")]
    InvalidContext(String),

    /// Context belongs to a different tenant than the one executing it
    #[error("Tenant mismatch: context user '{context_user}' does not match tenant '{tenant_user}'")]
    TenantMismatch {
        context_user: String,
        tenant_user: String,
    },

    /// Run id is empty or the reserved registry placeholder
    #[error("Forbidden run id: '{0}'")]
    ForbiddenRunId(String),

    /// Engine has been shut down and accepts no new work
    #[error("Engine is shut down")]
    ShutDown,

    /// Admission semaphore was closed while waiting
    #[error("Admission closed: {0}")]
    AdmissionClosed(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Execution tracker failure
    #[error("Tracker error: {0}")]
    Tracker(String),

    /// Event transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Pipeline step condition could not be evaluated
    #[error("Condition evaluation failed: {0}")]
    Condition(String),

    /// Tracing or metrics initialisation failed
    #[error("Observability initialisation failed: {0}")]
    Observability(String),

    /// JSON serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure reading a definition or config file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML pipeline definition failure
    #[error("Pipeline definition error: {0}")]
    PipelineDefinition(#[from] serde_yaml::Error),

    /// Pipeline definition parsed but is not runnable
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Background task failed (panicked or was aborted)
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    /// Whether this error belongs to the validation taxonomy
    ///
    /// Validation errors are raised synchronously, before any admission slot,
    /// registry lookup, or notification.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidContext(_)
                | EngineError::TenantMismatch { .. }
                | EngineError::ForbiddenRunId(_)
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;
