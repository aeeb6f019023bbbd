// src/runtime/supervisor.rs
//! Supervised background tasks
//!
//! Restarts a task that panics, with exponential backoff, up to a bounded
//! number of restarts. A task that returns normally is not restarted.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Restart policy for a supervised task
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub backoff: Duration,
}

/// Run `factory()` under supervision until it exits cleanly, `cancel` fires,
/// or it has panicked more than `policy.max_restarts` times
pub fn supervise<F, Fut>(
    name: &'static str,
    policy: RestartPolicy,
    cancel: CancellationToken,
    factory: F,
) -> JoinHandle<u32>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts = 0u32;

        loop {
            let mut task = tokio::spawn(factory());

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    task.abort();
                    None
                }
                joined = &mut task => Some(joined),
            };

            match outcome {
                None => {
                    info!(task = name, "Supervised task cancelled");
                    break;
                }
                Some(Ok(())) => {
                    info!(task = name, "Supervised task exited");
                    break;
                }
                Some(Err(e)) if e.is_panic() => {
                    if restarts >= policy.max_restarts {
                        error!(task = name, restarts, "Supervised task panicked too often, giving up");
                        break;
                    }
                    let delay = policy
                        .backoff
                        .saturating_mul(2u32.saturating_pow(restarts.min(16)));
                    restarts += 1;
                    warn!(task = name, restarts, delay_ms = delay.as_millis() as u64, "Supervised task panicked, restarting");

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Some(Err(_)) => break,
            }
        }

        restarts
    })
}
