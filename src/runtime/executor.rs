// src/runtime/executor.rs
//! Single-agent executor
//!
//! Runs one invocation end to end:
//!
//! ```text
//! validate ─▶ admit ─▶ track + heartbeat ─▶ resolve ─▶ agent_started
//!                                                          │
//!            ┌──────────── retry (backoff) ◀── error ──────┤
//!            ▼                                             │
//!      spawn(agent.execute) ⟷ timeout race ────────────────┘
//!                                                          │
//!   success | timeout | silent death | failure ──▶ terminal event
//!                                                          │
//!          release slot ─▶ stop heartbeat ─▶ history + stats
//! ```
//!
//! Only validation errors are returned as `Err`. Every other failure becomes
//! a failed `ExecutionResult`. Notifications and tracker writes are
//! best-effort and never fail the execution.
//!
//! A timed-out agent task is detached, not cancelled: dropping its
//! `JoinHandle` leaves it running and its eventual output is discarded.

use crate::agents::{Agent, AgentError, AgentRegistry};
use crate::events::{EventNotifier, TenantNotifier};
use crate::model::{
    AgentState, ExecutionContext, ExecutionResult, FailureKind, TenantContext,
    REGISTRY_PLACEHOLDER_RUN_ID,
};
use crate::runtime::classification::{
    backoff_delay, classify_agent_error, classify_kind, support_code, Classification,
};
use crate::runtime::governor::ConcurrencyGovernor;
use crate::runtime::heartbeat::HeartbeatHandle;
use crate::state::{ActiveRun, TenantStateStore};
use crate::tracking::{ExecutionTracker, TrackedState};
use crate::utils::config::ExecutionSettings;
use crate::utils::errors::{EngineError, Result};
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Result of a single attempt
enum Attempt {
    Completed(Option<AgentState>),
    Failed(AgentError),
    TimedOut,
}

/// Final classification of an invocation before it is reported
enum Outcome {
    Success(AgentState),
    Failed(AgentError, Classification),
    TimedOut,
    SilentDeath,
    NotFound,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Failed(..) => "failed",
            Outcome::TimedOut => "timeout",
            Outcome::SilentDeath => "silent_death",
            Outcome::NotFound => "not_found",
        }
    }
}

/// Tracker registration for one execution
struct Tracking {
    execution_id: String,
    /// `false` when the tracker rejected registration and a local id is used
    tracked: bool,
}

/// Check a context against the tenant executing it
///
/// Runs before any admission, registry lookup, or notification.
pub fn validate_context(context: &ExecutionContext, tenant: &TenantContext) -> Result<()> {
    validate_scope(context, tenant)?;
    if context.agent_name.trim().is_empty() {
        return Err(EngineError::InvalidContext("agent_name is empty".to_string()));
    }
    Ok(())
}

/// Tenant and run checks shared by single executions and pipelines
pub fn validate_scope(context: &ExecutionContext, tenant: &TenantContext) -> Result<()> {
    if tenant.user_id.trim().is_empty() {
        return Err(EngineError::InvalidContext("tenant user_id is empty".to_string()));
    }
    if context.user_id.trim().is_empty() {
        return Err(EngineError::InvalidContext("user_id is empty".to_string()));
    }
    if context.user_id != tenant.user_id {
        return Err(EngineError::TenantMismatch {
            context_user: context.user_id.clone(),
            tenant_user: tenant.user_id.clone(),
        });
    }
    if context.run_id.trim().is_empty() || context.run_id == REGISTRY_PLACEHOLDER_RUN_ID {
        return Err(EngineError::ForbiddenRunId(context.run_id.clone()));
    }
    if context.run_id != tenant.run_id {
        warn!(
            user_id = %context.user_id,
            context_run_id = %context.run_id,
            tenant_run_id = %tenant.run_id,
            "Execution run_id differs from tenant run_id"
        );
    }
    Ok(())
}

/// Executes single agent invocations
pub struct AgentExecutor {
    registry: Arc<dyn AgentRegistry>,
    tracker: Arc<dyn ExecutionTracker>,
    notifier: Arc<EventNotifier>,
    governor: Arc<ConcurrencyGovernor>,
    store: Arc<TenantStateStore>,
    settings: ExecutionSettings,
}

impl AgentExecutor {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        tracker: Arc<dyn ExecutionTracker>,
        notifier: Arc<EventNotifier>,
        governor: Arc<ConcurrencyGovernor>,
        store: Arc<TenantStateStore>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            registry,
            tracker,
            notifier,
            governor,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Execute one invocation against `state`
    #[instrument(
        skip(self, context, tenant, state),
        fields(agent = %context.agent_name, run_id = %context.run_id, user_id = %context.user_id)
    )]
    pub async fn execute(
        &self,
        context: ExecutionContext,
        tenant: &TenantContext,
        state: AgentState,
    ) -> Result<ExecutionResult> {
        validate_context(&context, tenant)?;
        let mut context = context;

        let admission = self.governor.admit().await.map_err(|_| EngineError::ShutDown)?;
        let queue_wait = admission.queue_wait();
        let tenant_state = self.store.state_lock(&context.user_id);
        tenant_state.lock().record_queue_wait(queue_wait);

        let tracking = self.register(&context).await;
        tenant_state.lock().begin_run(ActiveRun {
            execution_id: tracking.execution_id.clone(),
            run_id: context.run_id.clone(),
            agent_name: context.agent_name.clone(),
            started_at: chrono::Utc::now(),
        });
        let heartbeat = tracking.tracked.then(|| {
            HeartbeatHandle::spawn(
                Arc::clone(&self.tracker),
                tracking.execution_id.clone(),
                self.settings.heartbeat_interval(),
            )
        });

        let notifier = self.notifier.for_tenant(context.user_id.as_str());
        let started = Instant::now();

        let outcome = match self.registry.get_async(&context.agent_name, Some(tenant)).await {
            Some(agent) => {
                notifier
                    .notify_agent_started(
                        &context.run_id,
                        &context.agent_name,
                        json!({
                            "thread_id": context.thread_id,
                            "request_id": context.request_id,
                            "pipeline_step": context.pipeline_step,
                            "max_retries": context.max_retries,
                        }),
                    )
                    .await;
                self.run_with_retries(&agent, &mut context, &notifier, state).await
            }
            None => Outcome::NotFound,
        };

        let duration = started.elapsed();
        let label = outcome.label();
        let result = self
            .report(outcome, &context, &tracking, &notifier, duration)
            .await
            .with_metadata("attempts", context.retry_count + 1)
            .with_metadata("queue_wait_ms", queue_wait.as_millis() as u64);

        drop(admission);
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }
        {
            let mut state = tenant_state.lock();
            state.end_run(&tracking.execution_id);
            state.record_result(result.clone());
        }

        let agent = context.agent_name.clone();
        metrics::counter!("agent_engine_executions_total", "agent" => agent.clone(), "outcome" => label)
            .increment(1);
        metrics::histogram!("agent_engine_execution_seconds", "agent" => agent)
            .record(duration.as_secs_f64());

        info!(
            success = result.success,
            outcome = label,
            duration_ms = duration.as_millis() as u64,
            attempts = context.retry_count + 1,
            "Execution finished"
        );
        Ok(result)
    }

    /// Register with the tracker; falls back to an untracked local id
    async fn register(&self, context: &ExecutionContext) -> Tracking {
        match self.tracker.create_execution(context).await {
            Ok(execution_id) => {
                if let Err(e) = self.tracker.start_execution(&execution_id).await {
                    warn!(execution_id = %execution_id, error = %e, "Tracker failed to start execution");
                }
                Tracking {
                    execution_id,
                    tracked: true,
                }
            }
            Err(e) => {
                warn!(error = %e, "Tracker failed to create execution, continuing untracked");
                Tracking {
                    execution_id: format!("local_{}", ulid::Ulid::new()),
                    tracked: false,
                }
            }
        }
    }

    async fn run_with_retries(
        &self,
        agent: &Arc<dyn Agent>,
        context: &mut ExecutionContext,
        notifier: &TenantNotifier,
        state: AgentState,
    ) -> Outcome {
        loop {
            match self.attempt(agent, &context.run_id, state.clone()).await {
                Attempt::Completed(Some(output)) => return Outcome::Success(output),
                Attempt::Completed(None) => return Outcome::SilentDeath,
                Attempt::TimedOut => return Outcome::TimedOut,
                Attempt::Failed(err) => {
                    let classification = classify_agent_error(&err);
                    if !classification.retryable || !context.can_retry() {
                        return Outcome::Failed(err, classification);
                    }

                    let delay = backoff_delay(self.settings.retry_base_delay(), context.retry_count);
                    context.retry_count += 1;
                    let code = support_code(classification.kind, &context.agent_name);

                    warn!(
                        attempt = context.retry_count,
                        max_retries = context.max_retries,
                        error_kind = err.kind(),
                        error = %err,
                        support_code = %code,
                        delay_ms = delay.as_millis() as u64,
                        "Agent failed, retrying"
                    );
                    notifier
                        .notify_agent_thinking(
                            &context.run_id,
                            &context.agent_name,
                            &format!(
                                "{} Retrying now (support code {}).",
                                classification.user_message, code
                            ),
                            Some(context.retry_count),
                        )
                        .await;

                    self.store.state_lock(&context.user_id).lock().record_retry();
                    metrics::counter!("agent_engine_retries_total", "agent" => context.agent_name.clone())
                        .increment(1);

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One invocation raced against the timeout
    async fn attempt(&self, agent: &Arc<dyn Agent>, run_id: &str, state: AgentState) -> Attempt {
        let agent = Arc::clone(agent);
        let run_id = run_id.to_string();
        let task = tokio::spawn(async move { agent.execute(state, run_id, true).await });

        match tokio::time::timeout(self.settings.agent_execution_timeout(), task).await {
            Ok(Ok(Ok(output))) => Attempt::Completed(output),
            Ok(Ok(Err(err))) => Attempt::Failed(err),
            Ok(Err(join_error)) => Attempt::Failed(AgentError::Panicked(join_message(join_error))),
            Err(_) => Attempt::TimedOut,
        }
    }

    /// Settle the tracker, emit the terminal event, and build the result
    async fn report(
        &self,
        outcome: Outcome,
        context: &ExecutionContext,
        tracking: &Tracking,
        notifier: &TenantNotifier,
        duration: Duration,
    ) -> ExecutionResult {
        let agent = context.agent_name.as_str();
        let run_id = context.run_id.as_str();

        let (tracked_state, tracker_error) = match &outcome {
            Outcome::Success(_) => (TrackedState::Completed, None),
            Outcome::TimedOut => (TrackedState::TimedOut, Some("timeout".to_string())),
            Outcome::SilentDeath => (TrackedState::Failed, Some("silent failure".to_string())),
            Outcome::Failed(err, _) => (TrackedState::Failed, Some(err.to_string())),
            Outcome::NotFound => (TrackedState::Failed, Some("agent not found".to_string())),
        };

        if self.settle(tracking, tracked_state, tracker_error).await {
            // The watchdog already ran the death path for this execution
            warn!(execution_id = %tracking.execution_id, "Execution finished after being declared dead");
            let classification = classify_kind(FailureKind::Dead);
            return ExecutionResult::failure(
                agent,
                run_id,
                duration,
                FailureKind::Dead,
                format!("Agent '{}' was declared dead after losing its heartbeat", agent),
            )
            .with_execution_id(tracking.execution_id.as_str())
            .with_support_code(support_code(FailureKind::Dead, agent))
            .with_metadata("dead", true)
            .with_metadata("severity", classification.severity.as_str());
        }

        let result = match outcome {
            Outcome::Success(output) => {
                notifier
                    .notify_agent_completed(
                        run_id,
                        agent,
                        Value::Object(output.as_map().clone()),
                        duration.as_millis() as u64,
                    )
                    .await;
                ExecutionResult::success(agent, run_id, duration, output)
            }
            Outcome::TimedOut => {
                let timeout = self.settings.agent_execution_timeout();
                let classification = classify_kind(FailureKind::Timeout);
                let code = support_code(FailureKind::Timeout, agent);
                warn!(timeout_ms = timeout.as_millis() as u64, support_code = %code, "Agent timed out");

                notifier
                    .notify_agent_timeout(run_id, agent, classification.user_message, &code)
                    .await;
                metrics::counter!("agent_engine_deaths_total", "reason" => "timeout").increment(1);

                ExecutionResult::failure(
                    agent,
                    run_id,
                    duration,
                    FailureKind::Timeout,
                    format!("Agent '{}' timed out after {}", agent, human_duration(timeout)),
                )
                .with_support_code(code)
                .with_metadata("timeout", true)
                .with_metadata("severity", classification.severity.as_str())
            }
            Outcome::SilentDeath => {
                let classification = classify_kind(FailureKind::SilentDeath);
                let code = support_code(FailureKind::SilentDeath, agent);
                error!(support_code = %code, "Agent died silently");

                notifier
                    .notify_agent_death(
                        run_id,
                        agent,
                        "silent_failure",
                        classification.user_message,
                        &code,
                    )
                    .await;
                metrics::counter!("agent_engine_deaths_total", "reason" => "silent_failure").increment(1);

                ExecutionResult::failure(
                    agent,
                    run_id,
                    duration,
                    FailureKind::SilentDeath,
                    format!("Agent '{}' died silently without producing a result", agent),
                )
                .with_support_code(code)
                .with_metadata("silent_death", true)
                .with_metadata("severity", classification.severity.as_str())
            }
            Outcome::Failed(err, classification) => {
                let code = support_code(classification.kind, agent);
                error!(
                    error_kind = err.kind(),
                    error = %err,
                    severity = classification.severity.as_str(),
                    support_code = %code,
                    "Agent failed"
                );

                notifier
                    .notify_agent_error(run_id, agent, classification.user_message, &code, err.kind())
                    .await;

                ExecutionResult::failure(agent, run_id, duration, classification.kind, err.to_string())
                    .with_support_code(code)
                    .with_metadata("error_kind", err.kind())
                    .with_metadata("severity", classification.severity.as_str())
                    .with_metadata("retryable", classification.retryable)
            }
            Outcome::NotFound => {
                let classification = classify_kind(FailureKind::NotFound);
                let code = support_code(FailureKind::NotFound, agent);
                warn!(support_code = %code, "Agent not found in registry");

                notifier
                    .notify_agent_error(run_id, agent, classification.user_message, &code, "not_found")
                    .await;

                ExecutionResult::failure(
                    agent,
                    run_id,
                    duration,
                    FailureKind::NotFound,
                    format!("Agent '{}' not found", agent),
                )
                .with_support_code(code)
                .with_metadata("severity", classification.severity.as_str())
            }
        };

        result.with_execution_id(tracking.execution_id.as_str())
    }

    /// Move the tracker record to its terminal state
    ///
    /// Returns `true` when the record had already been declared dead.
    async fn settle(&self, tracking: &Tracking, state: TrackedState, error: Option<String>) -> bool {
        if !tracking.tracked {
            return false;
        }

        match self
            .tracker
            .update_execution_state(&tracking.execution_id, state, error)
            .await
        {
            Ok(()) => false,
            Err(e) => {
                let dead = matches!(
                    self.tracker.get_execution(&tracking.execution_id).await,
                    Some(record) if record.state == TrackedState::Dead
                );
                if !dead {
                    debug!(execution_id = %tracking.execution_id, error = %e, "Tracker update failed");
                }
                dead
            }
        }
    }
}

fn join_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "agent task was cancelled".to_string();
    }
    panic_message(error.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// `30s` for whole seconds, `250ms` otherwise
fn human_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 && duration.as_secs() > 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
