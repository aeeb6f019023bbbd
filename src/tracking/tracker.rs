// src/tracking/tracker.rs
//! Execution lifecycle tracker
//!
//! Records state transitions and liveness for every execution:
//!
//! ```text
//! Created ──▶ Running ──▶ Completed | Failed | TimedOut | Dead
//! ```
//!
//! Terminal states are final. Entering `Dead` or `TimedOut` fires the
//! registered callbacks, which is how deaths declared by any tracker client
//! reach the engine's death path.

use crate::model::ExecutionContext;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Lifecycle state of a tracked execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedState {
    Created,
    Running,
    Completed,
    Failed,
    TimedOut,
    Dead,
}

impl TrackedState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackedState::Completed | TrackedState::Failed | TrackedState::TimedOut | TrackedState::Dead
        )
    }
}

/// One tracked execution
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub user_id: String,
    pub run_id: String,
    pub agent_name: String,
    pub state: TrackedState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Instant,
    pub heartbeat_count: u64,
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn time_since_heartbeat(&self) -> Duration {
        self.last_heartbeat.elapsed()
    }
}

/// Callback fired on a lifecycle transition
pub type LifecycleCallback = Arc<dyn Fn(&ExecutionRecord) + Send + Sync>;

/// Lifecycle bookkeeper contract
#[async_trait]
pub trait ExecutionTracker: Send + Sync {
    /// Register a new execution; returns its execution id
    async fn create_execution(&self, context: &ExecutionContext) -> Result<String>;

    async fn start_execution(&self, execution_id: &str) -> Result<()>;

    /// Move to `state`; fails for unknown ids and from terminal states
    async fn update_execution_state(
        &self,
        execution_id: &str,
        state: TrackedState,
        error: Option<String>,
    ) -> Result<()>;

    /// Record liveness; `false` tells the heartbeat task to stop
    async fn heartbeat(&self, execution_id: &str) -> bool;

    async fn get_execution(&self, execution_id: &str) -> Option<ExecutionRecord>;

    /// Running executions whose last heartbeat is older than `threshold`
    async fn stale_executions(&self, threshold: Duration) -> Vec<ExecutionRecord>;

    /// Drop terminal records that finished more than `older_than` ago
    async fn purge_finished(&self, older_than: Duration) -> usize;

    fn on_death(&self, callback: LifecycleCallback);

    fn on_timeout(&self, callback: LifecycleCallback);
}

/// In-memory tracker
#[derive(Default)]
pub struct InMemoryExecutionTracker {
    records: DashMap<String, ExecutionRecord>,
    death_callbacks: RwLock<Vec<LifecycleCallback>>,
    timeout_callbacks: RwLock<Vec<LifecycleCallback>>,
}

impl InMemoryExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_in_state(&self, state: TrackedState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    fn fire(&self, record: &ExecutionRecord) {
        let callbacks = match record.state {
            TrackedState::Dead => self.death_callbacks.read().clone(),
            TrackedState::TimedOut => self.timeout_callbacks.read().clone(),
            _ => return,
        };
        for callback in callbacks {
            callback(record);
        }
    }
}

#[async_trait]
impl ExecutionTracker for InMemoryExecutionTracker {
    async fn create_execution(&self, context: &ExecutionContext) -> Result<String> {
        let execution_id = format!("exec_{}", ulid::Ulid::new());
        let record = ExecutionRecord {
            execution_id: execution_id.clone(),
            user_id: context.user_id.clone(),
            run_id: context.run_id.clone(),
            agent_name: context.agent_name.clone(),
            state: TrackedState::Created,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_heartbeat: Instant::now(),
            heartbeat_count: 0,
            error: None,
        };
        self.records.insert(execution_id.clone(), record);
        debug!(execution_id = %execution_id, agent = %context.agent_name, "Execution created");
        Ok(execution_id)
    }

    async fn start_execution(&self, execution_id: &str) -> Result<()> {
        let mut record = self
            .records
            .get_mut(execution_id)
            .ok_or_else(|| EngineError::Tracker(format!("unknown execution '{}'", execution_id)))?;

        if record.state != TrackedState::Created {
            return Err(EngineError::Tracker(format!(
                "cannot start execution '{}' from {:?}",
                execution_id, record.state
            )));
        }

        record.state = TrackedState::Running;
        record.started_at = Some(Utc::now());
        record.last_heartbeat = Instant::now();
        Ok(())
    }

    async fn update_execution_state(
        &self,
        execution_id: &str,
        state: TrackedState,
        error: Option<String>,
    ) -> Result<()> {
        let snapshot = {
            let mut record = self
                .records
                .get_mut(execution_id)
                .ok_or_else(|| EngineError::Tracker(format!("unknown execution '{}'", execution_id)))?;

            if record.state.is_terminal() {
                return Err(EngineError::Tracker(format!(
                    "execution '{}' already finished as {:?}",
                    execution_id, record.state
                )));
            }

            record.state = state;
            if error.is_some() {
                record.error = error;
            }
            if state.is_terminal() {
                record.finished_at = Some(Utc::now());
            }
            record.clone()
        };

        if matches!(state, TrackedState::Dead | TrackedState::TimedOut) {
            warn!(
                execution_id = %execution_id,
                agent = %snapshot.agent_name,
                state = ?state,
                "Execution entered failure state"
            );
            self.fire(&snapshot);
        }
        Ok(())
    }

    async fn heartbeat(&self, execution_id: &str) -> bool {
        match self.records.get_mut(execution_id) {
            Some(mut record) if !record.state.is_terminal() => {
                record.last_heartbeat = Instant::now();
                record.heartbeat_count += 1;
                true
            }
            _ => false,
        }
    }

    async fn get_execution(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.records.get(execution_id).map(|r| r.clone())
    }

    async fn stale_executions(&self, threshold: Duration) -> Vec<ExecutionRecord> {
        self.records
            .iter()
            .filter(|r| r.state == TrackedState::Running && r.time_since_heartbeat() > threshold)
            .map(|r| r.clone())
            .collect()
    }

    async fn purge_finished(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let before = self.records.len();
        self.records.retain(|_, r| match r.finished_at {
            Some(finished) if r.state.is_terminal() => finished > cutoff,
            _ => true,
        });
        before.saturating_sub(self.records.len())
    }

    fn on_death(&self, callback: LifecycleCallback) {
        self.death_callbacks.write().push(callback);
    }

    fn on_timeout(&self, callback: LifecycleCallback) {
        self.timeout_callbacks.write().push(callback);
    }
}
