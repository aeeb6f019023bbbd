// src/events/event.rs
//! Agent progress events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event kinds delivered to a tenant's connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentStarted,
    AgentThinking,
    ToolExecuting,
    ToolCompleted,
    AgentCompleted,
    AgentError,
    AgentDeath,
}

impl EventType {
    /// Whether this event ends a run's event stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventType::AgentCompleted | EventType::AgentError | EventType::AgentDeath
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentStarted => "agent_started",
            EventType::AgentThinking => "agent_thinking",
            EventType::ToolExecuting => "tool_executing",
            EventType::ToolCompleted => "tool_completed",
            EventType::AgentCompleted => "agent_completed",
            EventType::AgentError => "agent_error",
            EventType::AgentDeath => "agent_death",
        }
    }
}

/// One named event with a structured payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Unique event ID
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub run_id: String,

    pub agent_name: String,

    /// Tenant the event is routed to
    pub user_id: String,

    pub timestamp: DateTime<Utc>,

    pub payload: serde_json::Value,
}

impl AgentEvent {
    pub fn new(
        event_type: EventType,
        run_id: impl Into<String>,
        agent_name: impl Into<String>,
        user_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            event_type,
            run_id: run_id.into(),
            agent_name: agent_name.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_events() {
        assert!(EventType::AgentCompleted.is_terminal());
        assert!(EventType::AgentError.is_terminal());
        assert!(EventType::AgentDeath.is_terminal());
        assert!(!EventType::AgentStarted.is_terminal());
        assert!(!EventType::ToolExecuting.is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = AgentEvent::new(
            EventType::ToolCompleted,
            "run-1",
            "data",
            "alice",
            json!({"tool": "search"}),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_completed");
        assert_eq!(value["run_id"], "run-1");
        assert_eq!(value["payload"]["tool"], "search");
        assert_eq!(EventType::ToolCompleted.as_str(), "tool_completed");
    }
}
