// src/lib.rs
//! Agent Execution Engine Library
//!
//! Runs named agents on behalf of many concurrent, mutually isolated tenants,
//! streams ordered progress events to each tenant, and enforces admission
//! control, timeouts, retries, and death detection.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **model**: Contexts, results, pipeline steps, agent state
//! - **state**: Per-tenant isolated state with bounded history and stats
//! - **runtime**: Governor, executor, classification, heartbeat, watchdog
//! - **agents**: Agent and registry contracts, built-in demo agents
//! - **events**: Event types, ordered notifier, transports
//! - **tracking**: Execution lifecycle tracker
//! - **pipeline**: Multi-step orchestration and YAML definitions
//! - **observability**: Tracing and metrics setup
//! - **utils**: Configuration and errors

// Public module exports
pub mod agents;
pub mod engine;
pub mod events;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod runtime;
pub mod state;
pub mod tracking;
pub mod utils;

// Re-export commonly used types
pub use agents::{Agent, AgentError, AgentRegistry, InMemoryAgentRegistry};
pub use engine::{EngineBuilder, EngineStats, ExecutionEngine};
pub use events::{AgentEvent, EventNotifier, EventTransport, EventType};
pub use model::{
    AgentState, ExecutionContext, ExecutionResult, ExecutionStrategy, FailureKind, PipelineStep,
    TenantContext,
};
pub use pipeline::PipelineDefinition;
pub use tracking::{ExecutionTracker, InMemoryExecutionTracker, TrackedState};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
