// src/state/execution_state.rs
//! Per-tenant execution state
//!
//! Holds active runs, a bounded FIFO history of results, and counters plus
//! time-series samples for queue wait and execution time.

use crate::model::{ExecutionResult, FailureKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Bookkeeping for one in-flight execution
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRun {
    pub execution_id: String,
    pub run_id: String,
    pub agent_name: String,
    pub started_at: DateTime<Utc>,
}

/// Fixed-capacity window of duration samples
///
/// The maximum is tracked over all samples ever recorded, not just the window.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
    max: Duration,
    count: u64,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            max: Duration::ZERO,
            count: 0,
        }
    }

    pub fn record(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.max = self.max.max(sample);
        self.count += 1;
    }

    /// Mean over the retained window
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn total(&self) -> Duration {
        self.samples.iter().sum()
    }
}

/// Execution counters for one tenant
#[derive(Debug, Clone)]
pub struct TenantStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub dead_executions: u64,
    pub timeout_executions: u64,
    pub retries: u64,
    pub queue_wait: SampleWindow,
    pub execution_time: SampleWindow,
}

impl TenantStats {
    pub fn new(sample_capacity: usize) -> Self {
        Self {
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            dead_executions: 0,
            timeout_executions: 0,
            retries: 0,
            queue_wait: SampleWindow::new(sample_capacity),
            execution_time: SampleWindow::new(sample_capacity),
        }
    }
}

/// Serializable view of a tenant's stats
#[derive(Debug, Clone, Default, Serialize)]
pub struct TenantStatsSnapshot {
    pub user_id: String,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub dead_executions: u64,
    pub timeout_executions: u64,
    pub retries: u64,
    pub active_runs: usize,
    pub history_len: usize,
    pub avg_queue_wait_ms: f64,
    pub max_queue_wait_ms: f64,
    pub queue_wait_samples: usize,
    pub avg_execution_time_ms: f64,
    pub max_execution_time_ms: f64,
    pub execution_time_samples: usize,
}

/// State owned exclusively by one tenant's lock
#[derive(Debug)]
pub struct ExecutionState {
    pub active_runs: HashMap<String, ActiveRun>,
    history: VecDeque<ExecutionResult>,
    history_capacity: usize,
    pub stats: TenantStats,
}

impl ExecutionState {
    pub fn new(history_capacity: usize, sample_capacity: usize) -> Self {
        Self {
            active_runs: HashMap::new(),
            history: VecDeque::new(),
            history_capacity: history_capacity.max(1),
            stats: TenantStats::new(sample_capacity),
        }
    }

    pub fn begin_run(&mut self, run: ActiveRun) {
        self.active_runs.insert(run.execution_id.clone(), run);
    }

    pub fn end_run(&mut self, execution_id: &str) -> Option<ActiveRun> {
        self.active_runs.remove(execution_id)
    }

    /// Append to history, evicting the oldest entries past capacity
    pub fn push_history(&mut self, result: ExecutionResult) {
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(result);
    }

    /// Record a terminal result: history plus counters
    ///
    /// `Dead` results were already counted when the watchdog declared the
    /// death, so they do not bump `dead_executions` a second time.
    pub fn record_result(&mut self, result: ExecutionResult) {
        self.stats.total_executions += 1;
        self.stats.execution_time.record(result.duration);

        if result.success {
            self.stats.successful_executions += 1;
        } else {
            self.stats.failed_executions += 1;
            match result.failure_kind {
                Some(FailureKind::Timeout) => self.stats.timeout_executions += 1,
                Some(FailureKind::SilentDeath) => self.stats.dead_executions += 1,
                _ => {}
            }
        }

        self.push_history(result);
    }

    pub fn record_queue_wait(&mut self, wait: Duration) {
        self.stats.queue_wait.record(wait);
    }

    pub fn record_retry(&mut self) {
        self.stats.retries += 1;
    }

    pub fn record_death(&mut self) {
        self.stats.dead_executions += 1;
    }

    pub fn history(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn snapshot(&self, user_id: &str) -> TenantStatsSnapshot {
        let s = &self.stats;
        TenantStatsSnapshot {
            user_id: user_id.to_string(),
            total_executions: s.total_executions,
            successful_executions: s.successful_executions,
            failed_executions: s.failed_executions,
            dead_executions: s.dead_executions,
            timeout_executions: s.timeout_executions,
            retries: s.retries,
            active_runs: self.active_runs.len(),
            history_len: self.history.len(),
            avg_queue_wait_ms: millis(s.queue_wait.average()),
            max_queue_wait_ms: millis(s.queue_wait.max()),
            queue_wait_samples: s.queue_wait.len(),
            avg_execution_time_ms: millis(s.execution_time.average()),
            max_execution_time_ms: millis(s.execution_time.max()),
            execution_time_samples: s.execution_time.len(),
        }
    }

    /// Drop history, active runs, and samples
    pub fn clear(&mut self) {
        let sample_capacity = self.stats.queue_wait.capacity;
        self.active_runs.clear();
        self.history.clear();
        self.stats = TenantStats::new(sample_capacity);
    }
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
