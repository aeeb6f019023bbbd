// src/model/agent_state.rs
//! Opaque key/value state passed to agents

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// State handed to an agent and returned (possibly updated) on success
///
/// Pipelines thread the state returned by one step into the next step and
/// evaluate step conditions against it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentState {
    values: Map<String, Value>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Overlay every key of `other` onto this state
    pub fn merge(&mut self, other: &AgentState) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

impl From<Map<String, Value>> for AgentState {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}
