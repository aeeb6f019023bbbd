// src/events/notifier.rs
//! Ordered, best-effort event notifier
//!
//! Ordering contract per (tenant, run, agent):
//!
//! ```text
//! agent_started → (agent_thinking | tool_executing | tool_completed)* → terminal+
//! ```
//!
//! Several executions can share one stream (parallel pipeline steps running
//! the same agent), so the stream counts open executions: `agent_started`
//! opens one and a terminal event (`agent_completed`, `agent_error`,
//! `agent_death`) closes one. Once the last open execution has closed,
//! further progress events are suppressed, which keeps abandoned agents from
//! writing past the end of their run. Transport failures are counted and
//! reported as `false`; they never propagate to the caller. There are no
//! retries here.

use crate::events::event::{AgentEvent, EventType};
use crate::events::transport::EventTransport;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    /// Nothing delivered yet
    Pending,
    /// Number of started executions not yet closed
    Active(u32),
    /// A terminal event was delivered at this instant
    Terminated(Instant),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RunKey {
    user_id: String,
    run_id: String,
    agent_name: String,
}

/// Delivery counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotifierStats {
    pub delivered: u64,
    pub failed: u64,
    pub suppressed: u64,
    pub tracked_runs: usize,
}

/// Shared notifier; use [`EventNotifier::for_tenant`] to emit events
pub struct EventNotifier {
    transport: Arc<dyn EventTransport>,
    phases: DashMap<RunKey, Arc<Mutex<RunPhase>>>,
    delivered: AtomicU64,
    failed: AtomicU64,
    suppressed: AtomicU64,
}

impl EventNotifier {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self {
            transport,
            phases: DashMap::new(),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Notifier handle bound to one tenant's connections
    pub fn for_tenant(self: &Arc<Self>, user_id: impl Into<String>) -> TenantNotifier {
        TenantNotifier {
            user_id: user_id.into(),
            inner: Arc::clone(self),
        }
    }

    /// Deliver one event, enforcing run ordering
    pub async fn emit(&self, event: AgentEvent) -> bool {
        self.emit_closing(vec![event]).await
    }

    /// Deliver events belonging to one execution of one stream
    ///
    /// However many terminal events the batch holds, it closes at most one
    /// open execution. Returns `true` only if every event was delivered.
    pub async fn emit_closing(&self, events: Vec<AgentEvent>) -> bool {
        let Some(first) = events.first() else {
            return true;
        };
        let key = RunKey {
            user_id: first.user_id.clone(),
            run_id: first.run_id.clone(),
            agent_name: first.agent_name.clone(),
        };
        let phase = Arc::clone(
            self.phases
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(RunPhase::Pending)))
                .value(),
        );

        // Held across the sends so check-then-deliver is atomic per stream
        let mut phase = phase.lock().await;

        let mut delivered_all = true;
        let mut closes = false;
        for event in &events {
            let allowed = match event.event_type {
                EventType::AgentStarted => true,
                t if t.is_terminal() => true,
                _ => matches!(*phase, RunPhase::Active(_)),
            };

            if !allowed {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    run_id = %event.run_id,
                    agent = %event.agent_name,
                    event = event.event_type.as_str(),
                    "Suppressed out-of-order event"
                );
                delivered_all = false;
                continue;
            }

            // Ordering state advances even when the transport fails: the
            // execution did start or finish
            if !self.deliver(event).await {
                delivered_all = false;
            }
            if event.event_type == EventType::AgentStarted {
                open(&mut phase);
            }
            closes |= event.event_type.is_terminal();
        }

        if closes {
            close(&mut phase);
        }
        delivered_all
    }

    async fn deliver(&self, event: &AgentEvent) -> bool {
        match self.transport.send(&event.user_id, event).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                trace!(run_id = %event.run_id, event = event.event_type.as_str(), "Event sent");
                true
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    "agent_engine_notifications_failed_total",
                    "event" => event.event_type.as_str()
                )
                .increment(1);
                warn!(
                    run_id = %event.run_id,
                    user_id = %event.user_id,
                    event = event.event_type.as_str(),
                    error = %e,
                    "Event delivery failed"
                );
                false
            }
        }
    }

    /// Forget ordering state for runs terminated longer than `older_than` ago
    pub fn prune(&self, older_than: Duration) -> usize {
        let before = self.phases.len();
        self.phases.retain(|_, phase| match phase.try_lock() {
            Ok(guard) => match *guard {
                RunPhase::Terminated(at) => at.elapsed() < older_than,
                _ => true,
            },
            // Busy means an event is in flight for this run
            Err(_) => true,
        });
        before.saturating_sub(self.phases.len())
    }

    pub fn clear(&self) {
        self.phases.clear();
    }

    pub fn stats(&self) -> NotifierStats {
        NotifierStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            tracked_runs: self.phases.len(),
        }
    }

    pub fn failure_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

fn open(phase: &mut RunPhase) {
    *phase = match *phase {
        RunPhase::Active(n) => RunPhase::Active(n.saturating_add(1)),
        RunPhase::Pending | RunPhase::Terminated(_) => RunPhase::Active(1),
    };
}

fn close(phase: &mut RunPhase) {
    *phase = match *phase {
        RunPhase::Active(n) if n > 1 => RunPhase::Active(n - 1),
        RunPhase::Terminated(at) => RunPhase::Terminated(at),
        RunPhase::Active(_) | RunPhase::Pending => RunPhase::Terminated(Instant::now()),
    };
}

/// Tenant-scoped notifier exposing one method per event kind
#[derive(Clone)]
pub struct TenantNotifier {
    user_id: String,
    inner: Arc<EventNotifier>,
}

impl TenantNotifier {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn event(&self, event_type: EventType, run_id: &str, agent_name: &str, payload: Value) -> AgentEvent {
        AgentEvent::new(event_type, run_id, agent_name, self.user_id.clone(), payload)
    }

    async fn send(&self, event_type: EventType, run_id: &str, agent_name: &str, payload: Value) -> bool {
        let event = self.event(event_type, run_id, agent_name, payload);
        self.inner.emit(event).await
    }

    pub async fn notify_agent_started(&self, run_id: &str, agent_name: &str, context: Value) -> bool {
        let payload = json!({
            "status": "started",
            "agent_name": agent_name,
            "context": context,
        });
        self.send(EventType::AgentStarted, run_id, agent_name, payload).await
    }

    pub async fn notify_agent_thinking(
        &self,
        run_id: &str,
        agent_name: &str,
        reasoning: &str,
        step_number: Option<u32>,
    ) -> bool {
        let payload = json!({
            "reasoning": reasoning,
            "step_number": step_number,
        });
        self.send(EventType::AgentThinking, run_id, agent_name, payload).await
    }

    pub async fn notify_tool_executing(
        &self,
        run_id: &str,
        agent_name: &str,
        tool_name: &str,
        parameters: Value,
    ) -> bool {
        let payload = json!({
            "tool_name": tool_name,
            "parameters": parameters,
        });
        self.send(EventType::ToolExecuting, run_id, agent_name, payload).await
    }

    pub async fn notify_tool_completed(
        &self,
        run_id: &str,
        agent_name: &str,
        tool_name: &str,
        result: Value,
    ) -> bool {
        let payload = json!({
            "tool_name": tool_name,
            "result": result,
        });
        self.send(EventType::ToolCompleted, run_id, agent_name, payload).await
    }

    pub async fn notify_agent_completed(
        &self,
        run_id: &str,
        agent_name: &str,
        result: Value,
        duration_ms: u64,
    ) -> bool {
        let payload = json!({
            "status": "completed",
            "result": result,
            "duration_ms": duration_ms,
        });
        self.send(EventType::AgentCompleted, run_id, agent_name, payload).await
    }

    pub async fn notify_agent_error(
        &self,
        run_id: &str,
        agent_name: &str,
        message: &str,
        support_code: &str,
        error_kind: &str,
    ) -> bool {
        let payload = json!({
            "message": message,
            "support_code": support_code,
            "error_kind": error_kind,
        });
        self.send(EventType::AgentError, run_id, agent_name, payload).await
    }

    pub async fn notify_agent_death(
        &self,
        run_id: &str,
        agent_name: &str,
        death_type: &str,
        message: &str,
        support_code: &str,
    ) -> bool {
        let payload = death_payload(death_type, message, support_code);
        self.send(EventType::AgentDeath, run_id, agent_name, payload).await
    }

    /// `agent_death("timeout")` followed by `agent_error`, closing the
    /// execution once
    pub async fn notify_agent_timeout(
        &self,
        run_id: &str,
        agent_name: &str,
        message: &str,
        support_code: &str,
    ) -> bool {
        let death = self.event(
            EventType::AgentDeath,
            run_id,
            agent_name,
            death_payload("timeout", message, support_code),
        );
        let error = self.event(
            EventType::AgentError,
            run_id,
            agent_name,
            json!({
                "message": message,
                "support_code": support_code,
                "error_kind": "timeout",
            }),
        );
        self.inner.emit_closing(vec![death, error]).await
    }
}

fn death_payload(death_type: &str, message: &str, support_code: &str) -> Value {
    json!({
        "death_type": death_type,
        "message": message,
        "support_code": support_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_queue::BufferedTransport;
    use crate::events::transport::ChannelTransport;

    fn buffered() -> (Arc<EventNotifier>, Arc<BufferedTransport>) {
        let transport = Arc::new(BufferedTransport::new(64));
        let notifier = Arc::new(EventNotifier::new(transport.clone()));
        (notifier, transport)
    }

    fn types(transport: &BufferedTransport) -> Vec<EventType> {
        transport.drain().into_iter().map(|e| e.event_type).collect()
    }

    #[tokio::test]
    async fn test_ordered_sequence_is_delivered() {
        let (notifier, transport) = buffered();
        let n = notifier.for_tenant("alice");

        assert!(n.notify_agent_started("run-1", "data", json!({})).await);
        assert!(n.notify_agent_thinking("run-1", "data", "planning", Some(1)).await);
        assert!(n.notify_tool_executing("run-1", "data", "search", json!({"q": "x"})).await);
        assert!(n.notify_tool_completed("run-1", "data", "search", json!([])).await);
        assert!(n.notify_agent_completed("run-1", "data", json!({}), 12).await);

        assert_eq!(
            types(&transport),
            vec![
                EventType::AgentStarted,
                EventType::AgentThinking,
                EventType::ToolExecuting,
                EventType::ToolCompleted,
                EventType::AgentCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_after_terminal_is_suppressed() {
        let (notifier, transport) = buffered();
        let n = notifier.for_tenant("alice");

        n.notify_agent_started("run-1", "slow", json!({})).await;
        assert!(n.notify_agent_timeout("run-1", "slow", "Try again", "TMO-SLOW-ABC123").await);
        // Abandoned agent keeps talking
        assert!(!n.notify_agent_thinking("run-1", "slow", "still here", None).await);

        assert_eq!(
            types(&transport),
            vec![EventType::AgentStarted, EventType::AgentDeath, EventType::AgentError]
        );
        assert_eq!(notifier.stats().suppressed, 1);
    }

    #[tokio::test]
    async fn test_progress_before_start_is_suppressed() {
        let (notifier, transport) = buffered();
        let n = notifier.for_tenant("alice");

        assert!(!n.notify_tool_executing("run-1", "data", "search", json!({})).await);
        assert!(transport.drain().is_empty());
    }

    #[tokio::test]
    async fn test_restart_reopens_run() {
        let (notifier, transport) = buffered();
        let n = notifier.for_tenant("alice");

        n.notify_agent_started("run-1", "data", json!({})).await;
        n.notify_agent_completed("run-1", "data", json!({}), 1).await;
        n.notify_agent_started("run-1", "data", json!({})).await;
        assert!(n.notify_agent_thinking("run-1", "data", "again", None).await);

        assert_eq!(types(&transport).len(), 4);
    }

    #[tokio::test]
    async fn test_transport_failure_is_counted_not_raised() {
        let transport = Arc::new(ChannelTransport::new());
        let notifier = Arc::new(EventNotifier::new(transport));
        let n = notifier.for_tenant("offline-user");

        assert!(!n.notify_agent_started("run-1", "data", json!({})).await);
        assert_eq!(notifier.failure_count(), 1);
        // The run still counts as started for ordering purposes
        assert!(!n.notify_agent_thinking("run-1", "data", "x", None).await);
        assert_eq!(notifier.failure_count(), 2);
        assert_eq!(notifier.stats().suppressed, 0);
    }

    #[tokio::test]
    async fn test_prune_forgets_terminated_runs() {
        let (notifier, _transport) = buffered();
        let n = notifier.for_tenant("alice");

        n.notify_agent_started("run-1", "a", json!({})).await;
        n.notify_agent_completed("run-1", "a", json!({}), 1).await;
        n.notify_agent_started("run-2", "a", json!({})).await;

        assert_eq!(notifier.prune(Duration::ZERO), 1);
        assert_eq!(notifier.stats().tracked_runs, 1);
    }

    #[tokio::test]
    async fn test_shared_stream_stays_open_until_last_execution_closes() {
        let (notifier, transport) = buffered();
        let n = notifier.for_tenant("alice");

        // Two parallel steps running the same agent under one run
        n.notify_agent_started("run-1", "worker", json!({})).await;
        n.notify_agent_started("run-1", "worker", json!({})).await;
        n.notify_agent_completed("run-1", "worker", json!({}), 1).await;
        assert!(n.notify_agent_thinking("run-1", "worker", "still working", None).await);

        assert!(n.notify_agent_timeout("run-1", "worker", "Try again", "TMO-WORKER-000001").await);
        assert!(!n.notify_agent_thinking("run-1", "worker", "abandoned", None).await);

        assert_eq!(
            types(&transport),
            vec![
                EventType::AgentStarted,
                EventType::AgentStarted,
                EventType::AgentCompleted,
                EventType::AgentThinking,
                EventType::AgentDeath,
                EventType::AgentError,
            ]
        );
        assert_eq!(notifier.stats().suppressed, 1);
    }

    #[tokio::test]
    async fn test_death_carries_support_code() {
        let (notifier, transport) = buffered();
        let n = notifier.for_tenant("alice");

        n.notify_agent_started("run-1", "data", json!({})).await;
        n.notify_agent_death("run-1", "data", "heartbeat_lost", "Stopped", "DEAD-DATA-00ABCD")
            .await;

        let events = transport.drain();
        assert_eq!(events[1].payload["support_code"], "DEAD-DATA-00ABCD");
        assert_eq!(events[1].payload["death_type"], "heartbeat_lost");
    }
}
