// src/model/context.rs
//! Tenant and execution contexts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Run id reserved for registry access that is not bound to a real run
pub const REGISTRY_PLACEHOLDER_RUN_ID: &str = "registry";

/// Identity/session scope of one request
///
/// All per-tenant state is partitioned by `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantContext {
    pub user_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub request_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl TenantContext {
    pub fn new(
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            request_id: request_id.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build an execution context for `agent_name` scoped to this tenant
    pub fn execution_context(&self, agent_name: impl Into<String>) -> ExecutionContext {
        ExecutionContext {
            agent_name: agent_name.into(),
            user_id: self.user_id.clone(),
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
            request_id: self.request_id.clone(),
            retry_count: 0,
            max_retries: ExecutionContext::DEFAULT_MAX_RETRIES,
            timestamp: Utc::now(),
            pipeline_step: None,
            metadata: HashMap::new(),
        }
    }
}

/// Descriptor of one agent invocation
///
/// `retry_count` is the only field the executor mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub agent_name: String,
    pub user_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub request_id: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub pipeline_step: Option<usize>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn default_max_retries() -> u32 {
    ExecutionContext::DEFAULT_MAX_RETRIES
}

impl ExecutionContext {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Derive the context for one pipeline step
    ///
    /// Identity fields are preserved; the step's agent name and metadata are
    /// overlaid and the retry counter restarts.
    pub fn for_step(
        &self,
        agent_name: &str,
        step_index: usize,
        step_metadata: &HashMap<String, Value>,
    ) -> ExecutionContext {
        let mut metadata = self.metadata.clone();
        metadata.extend(step_metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

        ExecutionContext {
            agent_name: agent_name.to_string(),
            user_id: self.user_id.clone(),
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
            request_id: self.request_id.clone(),
            retry_count: 0,
            max_retries: self.max_retries,
            timestamp: Utc::now(),
            pipeline_step: Some(step_index),
            metadata,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
