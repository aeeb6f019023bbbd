// src/engine.rs
//! Execution engine facade
//!
//! Wires the governor, executor, orchestrator, notifier, tracker, and
//! watchdog together and exposes the public entry points:
//!
//! - `execute_agent` / `execute_pipeline`
//! - `get_execution_stats` / `get_tenant_stats` / `get_run_history`
//! - `shutdown` / `cleanup`
//!
//! # Example
//!
//! ```no_run
//! # use agent_engine::{EngineBuilder, InMemoryAgentRegistry, TenantContext};
//! # use std::sync::Arc;
//! # async fn run() -> agent_engine::Result<()> {
//! let registry = Arc::new(InMemoryAgentRegistry::new());
//! let engine = EngineBuilder::new().registry(registry).build()?;
//!
//! let tenant = TenantContext::new("alice", "thread-1", "run-1", "req-1");
//! let result = engine.execute_agent(engine.context(&tenant, "echo"), &tenant).await?;
//! println!("success: {}", result.success);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::agents::AgentRegistry;
use crate::events::{ChannelTransport, EventNotifier, EventTransport};
use crate::model::{AgentState, ExecutionContext, ExecutionResult, PipelineStep, TenantContext};
use crate::pipeline::PipelineOrchestrator;
use crate::runtime::{supervise, AgentExecutor, ConcurrencyGovernor, RestartPolicy, Watchdog};
use crate::state::{TenantStateStore, TenantStatsSnapshot};
use crate::tracking::{ExecutionTracker, InMemoryExecutionTracker};
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Engine-wide statistics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub dead_executions: u64,
    pub timeout_executions: u64,
    pub retries: u64,

    /// Executions currently holding an admission slot
    pub concurrent_executions: usize,
    pub max_concurrent: usize,
    pub available_permits: usize,
    pub peak_concurrent: usize,

    pub active_tenants: usize,
    pub active_runs: usize,

    pub avg_queue_wait_ms: f64,
    pub max_queue_wait_ms: f64,
    pub avg_execution_time_ms: f64,
    pub max_execution_time_ms: f64,

    pub notifications_delivered: u64,
    pub notifications_failed: u64,
    pub notifications_suppressed: u64,
}

/// Builder for [`ExecutionEngine`]
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<Arc<dyn AgentRegistry>>,
    tracker: Option<Arc<dyn ExecutionTracker>>,
    transport: Option<Arc<dyn EventTransport>>,
    notifier: Option<Arc<EventNotifier>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Agent registry (required)
    pub fn registry(mut self, registry: Arc<dyn AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Execution tracker; defaults to an in-memory tracker
    pub fn tracker(mut self, tracker: Arc<dyn ExecutionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Event transport; defaults to a `ChannelTransport`
    pub fn transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing notifier (e.g. one agents already emit through)
    ///
    /// Takes precedence over [`EngineBuilder::transport`].
    pub fn notifier(mut self, notifier: Arc<EventNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the engine; starts the watchdog when enabled
    ///
    /// Must be called inside a Tokio runtime when the watchdog is enabled.
    pub fn build(self) -> Result<ExecutionEngine> {
        self.config.validate().map_err(EngineError::Config)?;
        let config = self.config;

        let registry = self
            .registry
            .ok_or_else(|| EngineError::Config("an agent registry is required".to_string()))?;
        let tracker: Arc<dyn ExecutionTracker> = self
            .tracker
            .unwrap_or_else(|| Arc::new(InMemoryExecutionTracker::new()));
        let notifier = match (self.notifier, self.transport) {
            (Some(notifier), _) => notifier,
            (None, Some(transport)) => Arc::new(EventNotifier::new(transport)),
            (None, None) => Arc::new(EventNotifier::new(Arc::new(ChannelTransport::new()))),
        };

        let exec = &config.execution;
        let governor = Arc::new(ConcurrencyGovernor::new(exec.max_concurrent_agents));
        let store = Arc::new(TenantStateStore::new(
            exec.max_history_size,
            exec.stats_sample_capacity,
        ));
        let executor = Arc::new(AgentExecutor::new(
            registry,
            Arc::clone(&tracker),
            Arc::clone(&notifier),
            Arc::clone(&governor),
            Arc::clone(&store),
            exec.clone(),
        ));
        let orchestrator = PipelineOrchestrator::new(Arc::clone(&executor));

        let cancel = CancellationToken::new();
        let watchdog_task = if config.watchdog.enabled {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(EngineError::Config(
                    "the watchdog must be started inside a Tokio runtime".to_string(),
                ));
            }

            let watchdog = Arc::new(Watchdog::new(
                Arc::clone(&tracker),
                Arc::clone(&notifier),
                Arc::clone(&store),
                config.watchdog.clone(),
            ));
            let token = cancel.clone();
            let policy = RestartPolicy {
                max_restarts: config.watchdog.max_restarts,
                backoff: config.watchdog.restart_backoff(),
            };
            Some(supervise("watchdog", policy, cancel.clone(), move || {
                Arc::clone(&watchdog).run(token.clone())
            }))
        } else {
            None
        };

        info!(
            max_concurrent = exec.max_concurrent_agents,
            timeout_ms = exec.agent_execution_timeout_ms,
            max_history = exec.max_history_size,
            watchdog = config.watchdog.enabled,
            "Execution engine started"
        );

        Ok(ExecutionEngine {
            inner: Arc::new(EngineInner {
                config,
                executor,
                orchestrator,
                governor,
                store,
                notifier,
                tracker,
                watchdog_task: Mutex::new(watchdog_task),
                cancel,
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

struct EngineInner {
    config: EngineConfig,
    executor: Arc<AgentExecutor>,
    orchestrator: PipelineOrchestrator,
    governor: Arc<ConcurrencyGovernor>,
    store: Arc<TenantStateStore>,
    notifier: Arc<EventNotifier>,
    tracker: Arc<dyn ExecutionTracker>,
    watchdog_task: Mutex<Option<JoinHandle<u32>>>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Per-tenant isolated agent execution engine
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

impl ExecutionEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Execution context for `agent_name` using the configured retry budget
    pub fn context(&self, tenant: &TenantContext, agent_name: &str) -> ExecutionContext {
        tenant
            .execution_context(agent_name)
            .with_max_retries(self.inner.config.execution.default_max_retries)
    }

    /// Execute one agent with empty initial state
    pub async fn execute_agent(
        &self,
        context: ExecutionContext,
        tenant: &TenantContext,
    ) -> Result<ExecutionResult> {
        self.execute_agent_with_state(context, tenant, AgentState::new()).await
    }

    pub async fn execute_agent_with_state(
        &self,
        context: ExecutionContext,
        tenant: &TenantContext,
        state: AgentState,
    ) -> Result<ExecutionResult> {
        self.ensure_running()?;
        self.inner.executor.execute(context, tenant, state).await
    }

    /// Execute a pipeline with empty initial state
    pub async fn execute_pipeline(
        &self,
        steps: &[PipelineStep],
        base: &ExecutionContext,
        tenant: &TenantContext,
    ) -> Result<Vec<ExecutionResult>> {
        self.execute_pipeline_with_state(steps, base, tenant, AgentState::new())
            .await
    }

    pub async fn execute_pipeline_with_state(
        &self,
        steps: &[PipelineStep],
        base: &ExecutionContext,
        tenant: &TenantContext,
        state: AgentState,
    ) -> Result<Vec<ExecutionResult>> {
        self.ensure_running()?;
        self.inner.orchestrator.execute(steps, base, tenant, state).await
    }

    /// Read-only engine-wide snapshot
    pub fn get_execution_stats(&self) -> EngineStats {
        let inner = &self.inner;
        let tenants = inner.store.snapshots();
        let notifier = inner.notifier.stats();

        let mut stats = EngineStats {
            concurrent_executions: inner.governor.in_flight(),
            max_concurrent: inner.governor.max_concurrent(),
            available_permits: inner.governor.available(),
            peak_concurrent: inner.governor.peak(),
            active_tenants: tenants.len(),
            notifications_delivered: notifier.delivered,
            notifications_failed: notifier.failed,
            notifications_suppressed: notifier.suppressed,
            ..EngineStats::default()
        };

        let mut queue_wait_weighted = 0.0;
        let mut queue_wait_samples = 0usize;
        let mut exec_time_weighted = 0.0;
        let mut exec_time_samples = 0usize;

        for tenant in &tenants {
            stats.total_executions += tenant.total_executions;
            stats.successful_executions += tenant.successful_executions;
            stats.failed_executions += tenant.failed_executions;
            stats.dead_executions += tenant.dead_executions;
            stats.timeout_executions += tenant.timeout_executions;
            stats.retries += tenant.retries;
            stats.active_runs += tenant.active_runs;

            stats.max_queue_wait_ms = stats.max_queue_wait_ms.max(tenant.max_queue_wait_ms);
            stats.max_execution_time_ms = stats.max_execution_time_ms.max(tenant.max_execution_time_ms);

            queue_wait_weighted += tenant.avg_queue_wait_ms * tenant.queue_wait_samples as f64;
            queue_wait_samples += tenant.queue_wait_samples;
            exec_time_weighted += tenant.avg_execution_time_ms * tenant.execution_time_samples as f64;
            exec_time_samples += tenant.execution_time_samples;
        }

        if queue_wait_samples > 0 {
            stats.avg_queue_wait_ms = queue_wait_weighted / queue_wait_samples as f64;
        }
        if exec_time_samples > 0 {
            stats.avg_execution_time_ms = exec_time_weighted / exec_time_samples as f64;
        }

        stats
    }

    /// Stats for one tenant, if it has executed anything
    pub fn get_tenant_stats(&self, user_id: &str) -> Option<TenantStatsSnapshot> {
        self.inner
            .store
            .get(user_id)
            .map(|state| state.lock().snapshot(user_id))
    }

    /// The tenant's bounded history, oldest first
    pub fn get_run_history(&self, user_id: &str) -> Vec<ExecutionResult> {
        self.inner
            .store
            .get(user_id)
            .map(|state| state.lock().history().cloned().collect())
            .unwrap_or_default()
    }

    pub fn notifier(&self) -> Arc<EventNotifier> {
        Arc::clone(&self.inner.notifier)
    }

    pub fn tracker(&self) -> Arc<dyn ExecutionTracker> {
        Arc::clone(&self.inner.tracker)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Stop accepting work, drain in-flight executions, stop background
    /// tasks, and clear per-tenant state. Idempotent.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(in_flight = inner.governor.in_flight(), "Shutting down execution engine");
        let grace = inner.config.execution.shutdown_grace();
        if !inner.governor.drain(grace).await {
            warn!("Shutdown grace elapsed with executions still running");
        }

        inner.cancel.cancel();
        let watchdog = inner.watchdog_task.lock().take();
        if let Some(task) = watchdog {
            if let Err(e) = task.await {
                warn!(error = %e, "Watchdog task ended abnormally");
            }
        }

        inner.governor.close();
        inner.store.clear();
        inner.notifier.clear();
        info!("Execution engine shut down");
    }

    /// Alias for [`ExecutionEngine::shutdown`]
    pub async fn cleanup(&self) {
        self.shutdown().await;
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::InMemoryAgentRegistry;

    fn engine() -> ExecutionEngine {
        EngineBuilder::new()
            .registry(Arc::new(InMemoryAgentRegistry::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_registry_is_required() {
        assert!(matches!(EngineBuilder::new().build(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_watchdog_needs_runtime() {
        let result = EngineBuilder::new()
            .registry(Arc::new(InMemoryAgentRegistry::new()))
            .build();
        assert!(matches!(result, Err(EngineError::Config(_))));

        let mut config = EngineConfig::default();
        config.watchdog.enabled = false;
        assert!(EngineBuilder::new()
            .config(config)
            .registry(Arc::new(InMemoryAgentRegistry::new()))
            .build()
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.execution.max_concurrent_agents = 0;
        let result = EngineBuilder::new()
            .config(config)
            .registry(Arc::new(InMemoryAgentRegistry::new()))
            .build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_context_uses_configured_retries() {
        let mut config = EngineConfig::default();
        config.execution.default_max_retries = 7;
        let engine = EngineBuilder::new()
            .config(config)
            .registry(Arc::new(InMemoryAgentRegistry::new()))
            .build()
            .unwrap();

        let tenant = TenantContext::new("alice", "t", "r", "q");
        assert_eq!(engine.context(&tenant, "a").max_retries, 7);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_rejects_work() {
        let engine = engine();
        engine.shutdown().await;
        engine.cleanup().await;
        assert!(engine.is_shut_down());

        let tenant = TenantContext::new("alice", "t", "r", "q");
        let result = engine.execute_agent(engine.context(&tenant, "a"), &tenant).await;
        assert!(matches!(result, Err(EngineError::ShutDown)));
    }

    #[tokio::test]
    async fn test_empty_stats() {
        let engine = engine();
        let stats = engine.get_execution_stats();
        assert_eq!(stats.total_executions, 0);
        assert_eq!(stats.max_concurrent, 10);
        assert_eq!(stats.available_permits, 10);
        assert!(engine.get_tenant_stats("nobody").is_none());
        assert!(engine.get_run_history("nobody").is_empty());
    }
}
