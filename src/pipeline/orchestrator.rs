// src/pipeline/orchestrator.rs
//! Pipeline orchestrator
//!
//! Runs an ordered list of steps against shared state, each through the
//! single-agent executor with a context derived from the pipeline's base
//! context.
//!
//! - **Sequential** (default): one step at a time. A step whose condition is
//!   false (or fails to evaluate) is skipped. A failed step stops the
//!   pipeline unless it allows `continue_on_error`.
//! - **Parallel**: only when every step is parallel, none has dependencies or
//!   is sequential-only, and there is more than one step. If a step task
//!   fails outright, partial results are discarded and the whole group is
//!   re-run sequentially.

use crate::model::{AgentState, ExecutionContext, ExecutionResult, PipelineStep, TenantContext};
use crate::runtime::executor::{validate_scope, AgentExecutor};
use crate::utils::errors::{EngineError, Result};
use futures::future::join_all;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a pipeline group was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    Sequential,
    Parallel,
}

/// Decide how a group of steps runs
pub fn group_mode(steps: &[PipelineStep]) -> GroupMode {
    if steps.len() > 1 && steps.iter().all(PipelineStep::is_parallel_eligible) {
        GroupMode::Parallel
    } else {
        GroupMode::Sequential
    }
}

/// Evaluate a step's condition; errors and panics count as `false`
pub fn condition_holds(step: &PipelineStep, state: &AgentState) -> bool {
    let Some(condition) = &step.condition else {
        return true;
    };

    match catch_unwind(AssertUnwindSafe(|| condition(state))) {
        Ok(Ok(holds)) => holds,
        Ok(Err(e)) => {
            warn!(agent = %step.agent_name, error = %e, "Step condition failed, skipping step");
            false
        }
        Err(_) => {
            warn!(agent = %step.agent_name, "Step condition panicked, skipping step");
            false
        }
    }
}

pub struct PipelineOrchestrator {
    executor: Arc<AgentExecutor>,
}

impl PipelineOrchestrator {
    pub fn new(executor: Arc<AgentExecutor>) -> Self {
        Self { executor }
    }

    /// Execute `steps` and return the results gathered
    #[instrument(skip_all, fields(run_id = %base.run_id, user_id = %base.user_id, steps = steps.len()))]
    pub async fn execute(
        &self,
        steps: &[PipelineStep],
        base: &ExecutionContext,
        tenant: &TenantContext,
        state: AgentState,
    ) -> Result<Vec<ExecutionResult>> {
        validate_scope(base, tenant)?;
        if let Some(index) = steps.iter().position(|s| s.agent_name.trim().is_empty()) {
            return Err(EngineError::InvalidContext(format!(
                "pipeline step {} has no agent name",
                index
            )));
        }
        if steps.is_empty() {
            return Ok(Vec::new());
        }

        let results = match group_mode(steps) {
            GroupMode::Sequential => self.run_sequential(steps, base, tenant, state).await?,
            GroupMode::Parallel => self.run_parallel(steps, base, tenant, state).await?,
        };

        info!(
            executed = results.len(),
            succeeded = results.iter().filter(|r| r.success).count(),
            "Pipeline finished"
        );
        Ok(results)
    }

    async fn run_sequential(
        &self,
        steps: &[PipelineStep],
        base: &ExecutionContext,
        tenant: &TenantContext,
        state: AgentState,
    ) -> Result<Vec<ExecutionResult>> {
        let mut shared = state;
        let mut results = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            if !condition_holds(step, &shared) {
                debug!(step = index, agent = %step.agent_name, "Condition false, skipping step");
                continue;
            }

            let context = base.for_step(&step.agent_name, index, &step.metadata);
            let result = self.executor.execute(context, tenant, shared.clone()).await?;

            if let Some(output) = result.state.as_ref().filter(|_| result.success) {
                shared.merge(output);
            }

            let stop = !result.success && !step.allows_continue_on_error();
            results.push(result);

            if stop {
                info!(
                    step = index,
                    agent = %step.agent_name,
                    skipped = steps.len() - index - 1,
                    "Step failed, stopping pipeline"
                );
                break;
            }
        }

        Ok(results)
    }

    async fn run_parallel(
        &self,
        steps: &[PipelineStep],
        base: &ExecutionContext,
        tenant: &TenantContext,
        state: AgentState,
    ) -> Result<Vec<ExecutionResult>> {
        let handles: Vec<_> = steps
            .iter()
            .enumerate()
            .filter(|(_, step)| condition_holds(step, &state))
            .map(|(index, step)| {
                let executor = Arc::clone(&self.executor);
                let context = base.for_step(&step.agent_name, index, &step.metadata);
                let tenant = tenant.clone();
                let state = state.clone();
                tokio::spawn(async move { executor.execute(context, &tenant, state).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut broken = false;

        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    warn!(error = %e, "Parallel step raised");
                    broken = true;
                }
                Err(e) => {
                    warn!(error = %e, "Parallel step task failed");
                    broken = true;
                }
            }
        }

        if !broken {
            return Ok(results);
        }

        warn!(
            discarded = results.len(),
            "Parallel group failed, re-running sequentially"
        );
        let fallback = self.run_sequential(steps, base, tenant, state).await?;
        Ok(fallback
            .into_iter()
            .map(|result| result.with_metadata("fallback", true))
            .collect())
    }
}
