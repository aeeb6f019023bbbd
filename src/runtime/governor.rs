// src/runtime/governor.rs
//! Concurrency governor
//!
//! Bounds simultaneous agent invocations with a counting semaphore. Callers
//! suspend while all slots are taken (backpressure) and the time spent
//! waiting is reported as queue wait. A slot is released when its
//! `Admission` is dropped, so every exit path gives the permit back.
//!
//! ```text
//! admit() ──▶ [ permit 1 | permit 2 | ... | permit N ] ──▶ execute
//!   ▲ waits when all N are held              │
//!   └──────────── drop(Admission) ◀──────────┘
//! ```

use crate::utils::errors::{EngineError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A held admission slot
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    queue_wait: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl Admission {
    /// Time spent waiting for the slot
    pub fn queue_wait(&self) -> Duration {
        self.queue_wait
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        let now = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("agent_engine_in_flight").set(now as f64);
    }
}

/// Engine-wide admission control
pub struct ConcurrencyGovernor {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl ConcurrencyGovernor {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        info!("Initializing concurrency governor with {} slots", max_concurrent);

        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
        }
    }

    /// Wait for a free slot
    pub async fn admit(&self) -> Result<Admission> {
        let start = Instant::now();
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::AdmissionClosed("governor is closed".to_string()))?;

        Ok(self.admitted(permit, start.elapsed()))
    }

    /// Take a slot only if one is free right now
    pub fn try_admit(&self) -> Option<Admission> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(self.admitted(permit, Duration::ZERO))
    }

    fn admitted(&self, permit: OwnedSemaphorePermit, queue_wait: Duration) -> Admission {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        metrics::gauge!("agent_engine_in_flight").set(now as f64);
        metrics::histogram!("agent_engine_queue_wait_seconds").record(queue_wait.as_secs_f64());

        if queue_wait > Duration::from_secs(1) {
            debug!(wait_ms = queue_wait.as_millis() as u64, "Admission waited for a free slot");
        }

        Admission {
            _permit: permit,
            queue_wait,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Wait until every slot is free, up to `grace`
    ///
    /// Returns `true` if the governor drained in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        let all = self.max_concurrent as u32;
        match tokio::time::timeout(grace, self.semaphore.acquire_many(all)).await {
            Ok(Ok(_permits)) => true,
            Ok(Err(_)) => true,
            Err(_) => {
                warn!(
                    in_flight = self.in_flight(),
                    "Executions still running after {:?} drain grace",
                    grace
                );
                false
            }
        }
    }

    /// Refuse all further admissions; waiters fail immediately
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Highest number of simultaneously held slots observed
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admit_and_release() {
        let governor = ConcurrencyGovernor::new(2);

        let a = governor.admit().await.unwrap();
        let _b = governor.admit().await.unwrap();
        assert_eq!(governor.in_flight(), 2);
        assert_eq!(governor.available(), 0);
        assert!(governor.try_admit().is_none());

        drop(a);
        assert_eq!(governor.in_flight(), 1);
        assert!(governor.try_admit().is_some());
    }

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let governor = Arc::new(ConcurrencyGovernor::new(4));
        let mut handles = vec![];

        for _ in 0..32 {
            let governor = Arc::clone(&governor);
            handles.push(tokio::spawn(async move {
                let _slot = governor.admit().await.unwrap();
                assert!(governor.in_flight() <= 4);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(governor.in_flight(), 0);
        assert_eq!(governor.available(), 4);
        assert!(governor.peak() <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_wait_is_recorded() {
        let governor = Arc::new(ConcurrencyGovernor::new(1));
        let held = governor.admit().await.unwrap();

        let waiter = {
            let governor = Arc::clone(&governor);
            tokio::spawn(async move { governor.admit().await.unwrap().queue_wait() })
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        drop(held);

        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_close_rejects_admission() {
        let governor = ConcurrencyGovernor::new(1);
        governor.close();
        assert!(matches!(governor.admit().await, Err(EngineError::AdmissionClosed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out_with_work_in_flight() {
        let governor = ConcurrencyGovernor::new(2);
        let _held = governor.admit().await.unwrap();
        assert!(!governor.drain(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_drain_when_idle() {
        let governor = ConcurrencyGovernor::new(2);
        assert!(governor.drain(Duration::from_millis(100)).await);
        // Drained permits are returned
        assert_eq!(governor.available(), 2);
    }
}
