// src/runtime/heartbeat.rs
//! Per-execution heartbeat task
//!
//! Pings the tracker on a fixed interval until stopped, or until the tracker
//! refuses a heartbeat (the execution was declared dead or timed out
//! elsewhere).

use crate::tracking::ExecutionTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to a running heartbeat task
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    handle: JoinHandle<u64>,
}

impl HeartbeatHandle {
    /// Start pinging `execution_id` every `interval`
    pub fn spawn(tracker: Arc<dyn ExecutionTracker>, execution_id: String, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut beats = 0u64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if !tracker.heartbeat(&execution_id).await {
                            debug!(execution_id = %execution_id, "Tracker refused heartbeat, stopping");
                            break;
                        }
                        beats += 1;
                    }
                }
            }
            beats
        });

        Self { cancel, handle }
    }

    /// Stop the task and return how many heartbeats it sent
    pub async fn stop(mut self) -> u64 {
        self.cancel.cancel();
        (&mut self.handle).await.unwrap_or(0)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        // Unwinding executions must not leave a heartbeat running
        self.cancel.cancel();
    }
}
