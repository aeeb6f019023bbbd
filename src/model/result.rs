// src/model/result.rs
//! Execution results

use crate::model::agent_state::AgentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Why an execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Context rejected before execution
    Validation,
    /// Registry could not resolve the agent
    NotFound,
    /// Agent raised an error
    Execution,
    /// Wall-clock budget exceeded
    Timeout,
    /// Agent returned without a usable payload
    SilentDeath,
    /// Heartbeat loss declared by the watchdog
    Dead,
    /// Resource exhaustion or environment failure
    System,
}

impl FailureKind {
    /// Short code used as the first segment of support codes
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Validation => "VAL",
            FailureKind::NotFound => "NF",
            FailureKind::Execution => "EXEC",
            FailureKind::Timeout => "TMO",
            FailureKind::SilentDeath => "SIL",
            FailureKind::Dead => "DEAD",
            FailureKind::System => "SYS",
        }
    }
}

/// Terminal outcome of one agent invocation
///
/// Immutable once produced; appended to the tenant's bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub agent_name: String,
    pub run_id: String,
    pub execution_id: Option<String>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub support_code: Option<String>,
    pub state: Option<AgentState>,
    pub metadata: HashMap<String, Value>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(
        agent_name: impl Into<String>,
        run_id: impl Into<String>,
        duration: Duration,
        state: AgentState,
    ) -> Self {
        Self {
            success: true,
            agent_name: agent_name.into(),
            run_id: run_id.into(),
            execution_id: None,
            duration,
            error: None,
            failure_kind: None,
            support_code: None,
            state: Some(state),
            metadata: HashMap::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn failure(
        agent_name: impl Into<String>,
        run_id: impl Into<String>,
        duration: Duration,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            agent_name: agent_name.into(),
            run_id: run_id.into(),
            execution_id: None,
            duration,
            error: Some(error.into()),
            failure_kind: Some(kind),
            support_code: None,
            state: None,
            metadata: HashMap::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_support_code(mut self, code: impl Into<String>) -> Self {
        self.support_code = Some(code.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether a metadata flag (e.g. `timeout`, `fallback`) is set to `true`
    pub fn flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn is_timeout(&self) -> bool {
        self.failure_kind == Some(FailureKind::Timeout)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
