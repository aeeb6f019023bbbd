// src/pipeline/definition.rs
//! Declarative pipeline definitions
//!
//! Pipelines can be written as YAML:
//!
//! ```yaml
//! name: research
//! initial_state:
//!   topic: rust
//! steps:
//!   - agent: fetch
//!   - agent: summarize
//!     continue_on_error: true
//!     when: { key: documents, exists: true }
//!   - agent: publish
//!     when: { key: approved, equals: true }
//! ```

use crate::model::{AgentState, ExecutionStrategy, PipelineStep};
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// A complete pipeline as written in a definition file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// State the first step receives
    #[serde(default)]
    pub initial_state: AgentState,

    pub steps: Vec<StepDefinition>,
}

/// One step as written in a definition file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub agent: String,

    #[serde(default)]
    pub strategy: ExecutionStrategy,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub sequential_only: bool,

    #[serde(default)]
    pub when: Option<ConditionSpec>,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Declarative step condition: `key` equals a value, or exists (or not)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub key: String,

    #[serde(default)]
    pub equals: Option<Value>,

    #[serde(default)]
    pub exists: Option<bool>,
}

impl ConditionSpec {
    pub fn evaluate(&self, state: &AgentState) -> Result<bool> {
        match (&self.equals, self.exists) {
            (Some(expected), _) => Ok(state.get(&self.key) == Some(expected)),
            (None, Some(exists)) => Ok(state.contains(&self.key) == exists),
            (None, None) => Err(EngineError::Condition(format!(
                "condition on '{}' needs `equals` or `exists`",
                self.key
            ))),
        }
    }
}

impl PipelineDefinition {
    pub fn from_yaml(source: &str) -> Result<Self> {
        let definition: PipelineDefinition = serde_yaml::from_str(source)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }

    /// Reject definitions that parse but cannot run
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(EngineError::InvalidPipeline(format!(
                "pipeline '{}' has no steps",
                self.name
            )));
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.agent.trim().is_empty() {
                return Err(EngineError::InvalidPipeline(format!("step {} has no agent", index)));
            }
            if let Some(when) = &step.when {
                if when.equals.is_none() && when.exists.is_none() {
                    return Err(EngineError::InvalidPipeline(format!(
                        "step {} condition on '{}' needs `equals` or `exists`",
                        index, when.key
                    )));
                }
            }
            for dependency in &step.depends_on {
                if !self.steps[..index].iter().any(|s| &s.agent == dependency) {
                    return Err(EngineError::InvalidPipeline(format!(
                        "step {} depends on '{}', which does not run before it",
                        index, dependency
                    )));
                }
            }
        }

        Ok(())
    }

    /// Build runnable steps
    pub fn into_steps(&self) -> Vec<PipelineStep> {
        self.steps.iter().map(StepDefinition::to_step).collect()
    }
}

impl StepDefinition {
    fn to_step(&self) -> PipelineStep {
        let mut step = PipelineStep::new(self.agent.as_str())
            .with_strategy(self.strategy)
            .continue_on_error(self.continue_on_error);

        for (key, value) in &self.metadata {
            step = step.with_metadata(key.as_str(), value.clone());
        }
        for dependency in &self.depends_on {
            step = step.depends_on(dependency.as_str());
        }
        if self.sequential_only {
            step = step.sequential_only();
        }
        if let Some(when) = self.when.clone() {
            step = step.with_condition(move |state| when.evaluate(state));
        }
        step
    }
}
