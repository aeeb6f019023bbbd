// src/agents/builtin.rs
//! Built-in demonstration agents
//!
//! - `echo`: copies `message` to `echo`, counts invocations in `echo_count`
//! - `sleep`: waits `sleep_ms` (default 100) and records `slept_ms`
//! - `fail`: always fails; `fail_kind` selects the error (`system`,
//!   `network`, `invalid_input`, anything else is a plain execution error)
//!
//! Agents are registered as factories so each resolution is bound to the
//! requesting tenant's notifier and can stream progress events.

use crate::agents::{Agent, AgentError, InMemoryAgentRegistry};
use crate::events::{EventNotifier, TenantNotifier};
use crate::model::{AgentState, TenantContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn tenant_notifier(notifier: &Arc<EventNotifier>, context: Option<&TenantContext>) -> Option<TenantNotifier> {
    context.map(|tenant| notifier.for_tenant(tenant.user_id.as_str()))
}

pub struct EchoAgent {
    notifier: Option<TenantNotifier>,
}

impl EchoAgent {
    pub fn new(notifier: Option<TenantNotifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(
        &self,
        state: AgentState,
        run_id: String,
        stream_updates: bool,
    ) -> Result<Option<AgentState>, AgentError> {
        let message = state.get("message").cloned().unwrap_or(Value::Null);

        if let Some(notifier) = self.notifier.as_ref().filter(|_| stream_updates) {
            notifier
                .notify_agent_thinking(&run_id, "echo", "Repeating the message back", Some(1))
                .await;
            notifier
                .notify_tool_executing(&run_id, "echo", "echo", json!({ "message": message }))
                .await;
            notifier
                .notify_tool_completed(&run_id, "echo", "echo", message.clone())
                .await;
        }

        let count = state.get("echo_count").and_then(Value::as_u64).unwrap_or(0) + 1;
        Ok(Some(state.with("echo", message).with("echo_count", count)))
    }
}

pub struct SleepAgent {
    notifier: Option<TenantNotifier>,
}

impl SleepAgent {
    pub fn new(notifier: Option<TenantNotifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Agent for SleepAgent {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn execute(
        &self,
        state: AgentState,
        run_id: String,
        stream_updates: bool,
    ) -> Result<Option<AgentState>, AgentError> {
        let millis = state.get("sleep_ms").and_then(Value::as_u64).unwrap_or(100);

        if let Some(notifier) = self.notifier.as_ref().filter(|_| stream_updates) {
            notifier
                .notify_agent_thinking(&run_id, "sleep", &format!("Waiting {}ms", millis), None)
                .await;
        }

        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(Some(state.with("slept_ms", millis)))
    }
}

pub struct FailAgent;

#[async_trait]
impl Agent for FailAgent {
    fn name(&self) -> &str {
        "fail"
    }

    async fn execute(
        &self,
        state: AgentState,
        _run_id: String,
        _stream_updates: bool,
    ) -> Result<Option<AgentState>, AgentError> {
        let kind = state.get("fail_kind").and_then(Value::as_str).unwrap_or("execution");
        Err(match kind {
            "system" => AgentError::System("requested system failure".to_string()),
            "network" => AgentError::Network("requested network failure".to_string()),
            "invalid_input" => AgentError::InvalidInput("requested invalid input".to_string()),
            _ => AgentError::Execution("requested failure".to_string()),
        })
    }
}

/// Register `echo`, `sleep`, and `fail`
pub fn register_builtins(registry: &InMemoryAgentRegistry, notifier: Arc<EventNotifier>) {
    let echo_notifier = Arc::clone(&notifier);
    registry.register_factory("echo", move |context| {
        Arc::new(EchoAgent::new(tenant_notifier(&echo_notifier, context))) as Arc<dyn Agent>
    });

    registry.register_factory("sleep", move |context| {
        Arc::new(SleepAgent::new(tenant_notifier(&notifier, context))) as Arc<dyn Agent>
    });

    registry.register(Arc::new(FailAgent));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRegistry;
    use crate::events::{BufferedTransport, EventType};

    #[tokio::test]
    async fn test_echo_streams_progress_for_tenant() {
        let transport = Arc::new(BufferedTransport::new(16));
        let notifier = Arc::new(EventNotifier::new(transport.clone()));
        let registry = InMemoryAgentRegistry::new();
        register_builtins(&registry, Arc::clone(&notifier));
        assert_eq!(registry.names(), vec!["echo", "fail", "sleep"]);

        let tenant = TenantContext::new("alice", "t", "run-1", "q");
        let echo = registry.get_async("echo", Some(&tenant)).await.unwrap();

        notifier
            .for_tenant("alice")
            .notify_agent_started("run-1", "echo", json!({}))
            .await;
        let output = echo
            .execute(AgentState::new().with("message", "hi"), "run-1".into(), true)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(output.get("echo"), Some(&json!("hi")));
        assert_eq!(output.get("echo_count"), Some(&json!(1)));

        let events = transport.drain();
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.user_id == "alice"));
        assert_eq!(events[3].event_type, EventType::ToolCompleted);
    }

    #[tokio::test]
    async fn test_echo_without_context_is_quiet() {
        let transport = Arc::new(BufferedTransport::new(16));
        let registry = InMemoryAgentRegistry::new();
        register_builtins(&registry, Arc::new(EventNotifier::new(transport.clone())));

        let echo = registry.get_async("echo", None).await.unwrap();
        assert!(echo
            .execute(AgentState::new(), "run-1".into(), true)
            .await
            .unwrap()
            .is_some());
        assert!(transport.drain().is_empty());
    }

    #[tokio::test]
    async fn test_fail_kinds() {
        let err = FailAgent
            .execute(AgentState::new().with("fail_kind", "system"), "r".into(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::System(_)));

        let err = FailAgent
            .execute(AgentState::new(), "r".into(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Execution(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_reads_duration() {
        let output = SleepAgent::new(None)
            .execute(AgentState::new().with("sleep_ms", 250), "r".into(), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(output.get("slept_ms"), Some(&json!(250)));
    }
}
