// src/model/step.rs
//! Pipeline step descriptors

use crate::model::agent_state::AgentState;
use crate::utils::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a step runs against the current state
///
/// An `Err` (or a panic) is treated as `false`.
pub type StepCondition = Arc<dyn Fn(&AgentState) -> Result<bool, EngineError> + Send + Sync>;

/// How a step wants to be scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    Parallel,
}

/// One step of a pipeline
#[derive(Clone)]
pub struct PipelineStep {
    pub agent_name: String,
    pub strategy: ExecutionStrategy,
    pub condition: Option<StepCondition>,
    /// Names of steps this one depends on
    pub dependencies: Vec<String>,
    /// Forces the whole group onto the sequential path
    pub sequential_only: bool,
    pub metadata: HashMap<String, Value>,
}

impl PipelineStep {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            strategy: ExecutionStrategy::Sequential,
            condition: None,
            dependencies: Vec::new(),
            sequential_only: false,
            metadata: HashMap::new(),
        }
    }

    pub fn parallel(agent_name: impl Into<String>) -> Self {
        Self::new(agent_name).with_strategy(ExecutionStrategy::Parallel)
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&AgentState) -> Result<bool, EngineError> + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.dependencies.push(step.into());
        self
    }

    pub fn sequential_only(mut self) -> Self {
        self.sequential_only = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.metadata
            .insert("continue_on_error".to_string(), Value::Bool(enabled));
        self
    }

    /// Whether a failure of this step lets the pipeline go on
    pub fn allows_continue_on_error(&self) -> bool {
        self.metadata
            .get("continue_on_error")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether this step can take part in a parallel group
    pub fn is_parallel_eligible(&self) -> bool {
        self.strategy == ExecutionStrategy::Parallel
            && self.dependencies.is_empty()
            && !self.sequential_only
    }
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("agent_name", &self.agent_name)
            .field("strategy", &self.strategy)
            .field("has_condition", &self.condition.is_some())
            .field("dependencies", &self.dependencies)
            .field("sequential_only", &self.sequential_only)
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_on_error_flag() {
        assert!(!PipelineStep::new("a").allows_continue_on_error());
        assert!(PipelineStep::new("a").continue_on_error(true).allows_continue_on_error());
        assert!(!PipelineStep::new("a")
            .with_metadata("continue_on_error", "yes")
            .allows_continue_on_error());
    }

    #[test]
    fn test_parallel_eligibility() {
        assert!(PipelineStep::parallel("a").is_parallel_eligible());
        assert!(!PipelineStep::new("a").is_parallel_eligible());
        assert!(!PipelineStep::parallel("a").depends_on("b").is_parallel_eligible());
        assert!(!PipelineStep::parallel("a").sequential_only().is_parallel_eligible());
    }
}
