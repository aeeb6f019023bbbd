// src/model/mod.rs
//! Execution data model
//!
//! - **TenantContext**: Identity/session scope governing isolation
//! - **ExecutionContext**: Descriptor of one agent invocation
//! - **AgentState**: Shared state handed to agents and threaded through pipelines
//! - **ExecutionResult**: Terminal outcome of one invocation
//! - **PipelineStep**: One step of a multi-agent pipeline

pub mod agent_state;
pub mod context;
pub mod result;
pub mod step;

pub use agent_state::AgentState;
pub use context::{ExecutionContext, TenantContext, REGISTRY_PLACEHOLDER_RUN_ID};
pub use result::{ExecutionResult, FailureKind};
pub use step::{ExecutionStrategy, PipelineStep, StepCondition};
