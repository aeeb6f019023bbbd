// src/agents/mod.rs
//! Agent abstractions
//!
//! - **Agent**: Single-capability unit of work (`execute`)
//! - **AgentError**: What an agent raises when it fails
//! - **AgentRegistry**: Resolves an agent by logical name for a tenant
//! - **Builtin**: `echo`, `sleep`, and `fail` demonstration agents

pub mod builtin;
pub mod registry;

pub use builtin::{register_builtins, EchoAgent, FailAgent, SleepAgent};
pub use registry::{AgentFactory, AgentRegistry, InMemoryAgentRegistry};

use crate::model::AgentState;
use async_trait::async_trait;
use thiserror::Error;

/// A unit of work exposing a uniform `execute` contract
///
/// Returning `Ok(None)` claims completion without a usable payload; the
/// executor treats that as a silent death.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Logical agent name
    fn name(&self) -> &str;

    /// Run the agent against `state` for `run_id`
    async fn execute(
        &self,
        state: AgentState,
        run_id: String,
        stream_updates: bool,
    ) -> Result<Option<AgentState>, AgentError>;
}

/// Errors raised by agents
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("model call failed: {0}")]
    Llm(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("system failure: {0}")]
    System(String),

    #[error("agent panicked: {0}")]
    Panicked(String),
}

impl AgentError {
    /// Stable kind label, used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Execution(_) => "execution",
            AgentError::Tool { .. } => "tool",
            AgentError::Llm(_) => "llm",
            AgentError::Network(_) => "network",
            AgentError::InvalidInput(_) => "invalid_input",
            AgentError::ResourceExhausted(_) => "resource_exhausted",
            AgentError::System(_) => "system",
            AgentError::Panicked(_) => "panicked",
        }
    }
}
