// src/runtime/watchdog.rs
//! Death/timeout watchdog
//!
//! Periodically scans the tracker for running executions whose last
//! heartbeat is older than the death threshold and declares them dead. The
//! death path itself is driven by the tracker's death callback, so a death
//! declared by any tracker client lands here as well:
//!
//! ```text
//! scan_once ──▶ tracker.update(Dead) ──▶ on_death callback
//!                                              │ (channel)
//!                                              ▼
//!                 agent_death event ◀── handle_death ──▶ tenant stats
//! ```
//!
//! Each tick also prunes expired notifier ordering state and purges
//! finished tracker records.

use crate::events::EventNotifier;
use crate::model::FailureKind;
use crate::runtime::classification::{support_code, user_message};
use crate::state::TenantStateStore;
use crate::tracking::{ExecutionRecord, ExecutionTracker, TrackedState};
use crate::utils::config::WatchdogSettings;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why an execution was declared dead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathReason {
    /// No heartbeat within the death threshold
    HeartbeatLost,
}

impl DeathReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeathReason::HeartbeatLost => "heartbeat_lost",
        }
    }
}

/// One death waiting to be handled
#[derive(Debug, Clone)]
pub struct DeathNotice {
    pub execution_id: String,
    pub user_id: String,
    pub run_id: String,
    pub agent_name: String,
    pub reason: DeathReason,
}

impl DeathNotice {
    fn from_record(record: &ExecutionRecord) -> Self {
        Self {
            execution_id: record.execution_id.clone(),
            user_id: record.user_id.clone(),
            run_id: record.run_id.clone(),
            agent_name: record.agent_name.clone(),
            reason: DeathReason::HeartbeatLost,
        }
    }
}

pub struct Watchdog {
    tracker: Arc<dyn ExecutionTracker>,
    notifier: Arc<EventNotifier>,
    store: Arc<TenantStateStore>,
    settings: WatchdogSettings,
    /// Survives task restarts; only the running loop holds the lock
    deaths: Arc<Mutex<mpsc::UnboundedReceiver<DeathNotice>>>,
}

impl Watchdog {
    /// Create the watchdog and subscribe to the tracker's lifecycle callbacks
    pub fn new(
        tracker: Arc<dyn ExecutionTracker>,
        notifier: Arc<EventNotifier>,
        store: Arc<TenantStateStore>,
        settings: WatchdogSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tracker.on_death(Arc::new(move |record: &ExecutionRecord| {
            if tx.send(DeathNotice::from_record(record)).is_err() {
                debug!(execution_id = %record.execution_id, "Watchdog gone, death notice dropped");
            }
        }));
        tracker.on_timeout(Arc::new(|record: &ExecutionRecord| {
            debug!(
                execution_id = %record.execution_id,
                agent = %record.agent_name,
                "Execution timed out"
            );
        }));

        Self {
            tracker,
            notifier,
            store,
            settings,
            deaths: Arc::new(Mutex::new(rx)),
        }
    }

    /// Declare every stale running execution dead; returns how many were marked
    pub async fn scan_once(&self) -> usize {
        let threshold = self.settings.death_threshold();
        let stale = self.tracker.stale_executions(threshold).await;
        let mut marked = 0;

        for record in stale {
            let silence = record.time_since_heartbeat();
            let reason = format!("no heartbeat for {}ms", silence.as_millis());
            match self
                .tracker
                .update_execution_state(&record.execution_id, TrackedState::Dead, Some(reason))
                .await
            {
                Ok(()) => {
                    warn!(
                        execution_id = %record.execution_id,
                        agent = %record.agent_name,
                        user_id = %record.user_id,
                        silence_ms = silence.as_millis() as u64,
                        "Declared execution dead"
                    );
                    marked += 1;
                }
                // Finished between the scan and the update
                Err(e) => debug!(execution_id = %record.execution_id, error = %e, "Skipped stale record"),
            }
        }

        marked
    }

    /// Run the death path for one execution
    pub async fn handle_death(&self, notice: DeathNotice) {
        let code = support_code(FailureKind::Dead, &notice.agent_name);
        warn!(
            execution_id = %notice.execution_id,
            agent = %notice.agent_name,
            support_code = %code,
            "Reporting dead execution"
        );
        self.notifier
            .for_tenant(notice.user_id.as_str())
            .notify_agent_death(
                &notice.run_id,
                &notice.agent_name,
                notice.reason.as_str(),
                user_message(FailureKind::Dead),
                &code,
            )
            .await;

        {
            let state = self.store.state_lock(&notice.user_id);
            let mut state = state.lock();
            state.record_death();
            state.end_run(&notice.execution_id);
        }

        metrics::counter!("agent_engine_deaths_total", "reason" => notice.reason.as_str()).increment(1);
    }

    /// Handle every queued death without waiting; returns how many were handled
    pub async fn process_pending(&self) -> usize {
        let mut pending = Vec::new();
        {
            let mut deaths = self.deaths.lock().await;
            while let Ok(notice) = deaths.try_recv() {
                pending.push(notice);
            }
        }

        let handled = pending.len();
        for notice in pending {
            self.handle_death(notice).await;
        }
        handled
    }

    /// Periodic housekeeping: notifier ordering state and finished records
    pub async fn housekeeping(&self) {
        let retention = self.settings.event_retention();
        let pruned = self.notifier.prune(retention);
        let purged = self.tracker.purge_finished(retention).await;
        if pruned > 0 || purged > 0 {
            debug!(pruned, purged, "Watchdog housekeeping");
        }
    }

    /// Main loop; returns when `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut deaths = self.deaths.lock().await;
        let mut ticker = tokio::time::interval(self.settings.scan_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            scan_interval_ms = self.settings.scan_interval_ms,
            death_threshold_ms = self.settings.death_threshold_ms,
            "Watchdog started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.scan_once().await;
                    self.housekeeping().await;
                }
                notice = deaths.recv() => match notice {
                    Some(notice) => self.handle_death(notice).await,
                    None => break,
                },
            }
        }

        info!("Watchdog stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BufferedTransport, EventType};
    use crate::model::TenantContext;
    use crate::state::ActiveRun;
    use crate::tracking::InMemoryExecutionTracker;
    use std::time::Duration;

    fn settings() -> WatchdogSettings {
        WatchdogSettings {
            scan_interval_ms: 100,
            death_threshold_ms: 1_000,
            ..WatchdogSettings::default()
        }
    }

    struct Fixture {
        watchdog: Arc<Watchdog>,
        tracker: Arc<InMemoryExecutionTracker>,
        transport: Arc<BufferedTransport>,
        store: Arc<TenantStateStore>,
    }

    fn fixture() -> Fixture {
        let tracker = Arc::new(InMemoryExecutionTracker::new());
        let transport = Arc::new(BufferedTransport::new(64));
        let notifier = Arc::new(EventNotifier::new(transport.clone()));
        let store = Arc::new(TenantStateStore::default());
        let watchdog = Arc::new(Watchdog::new(
            tracker.clone(),
            notifier,
            store.clone(),
            settings(),
        ));
        Fixture {
            watchdog,
            tracker,
            transport,
            store,
        }
    }

    async fn running(f: &Fixture, user: &str) -> String {
        let ctx = TenantContext::new(user, "t", "run-1", "q").execution_context("stuck");
        let id = f.tracker.create_execution(&ctx).await.unwrap();
        f.tracker.start_execution(&id).await.unwrap();
        f.store.state_lock(user).lock().begin_run(ActiveRun {
            execution_id: id.clone(),
            run_id: "run-1".into(),
            agent_name: "stuck".into(),
            started_at: chrono::Utc::now(),
        });
        id
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_declares_stale_execution_dead() {
        let f = fixture();
        let id = running(&f, "alice").await;

        assert_eq!(f.watchdog.scan_once().await, 0);
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(f.watchdog.scan_once().await, 1);
        assert_eq!(f.tracker.get_execution(&id).await.unwrap().state, TrackedState::Dead);

        assert_eq!(f.watchdog.process_pending().await, 1);

        let events = f.transport.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::AgentDeath);
        assert_eq!(events[0].payload["death_type"], "heartbeat_lost");
        assert_eq!(events[0].payload["message"], user_message(FailureKind::Dead));
        assert!(events[0].payload["support_code"]
            .as_str()
            .unwrap()
            .starts_with("DEAD-"));

        let state = f.store.state_lock("alice");
        let state = state.lock();
        assert_eq!(state.stats.dead_executions, 1);
        assert!(state.active_runs.is_empty());
    }

    #[tokio::test]
    async fn test_external_death_reaches_tenant() {
        let f = fixture();
        let id = running(&f, "bob").await;

        f.tracker
            .update_execution_state(&id, TrackedState::Dead, Some("killed".into()))
            .await
            .unwrap();
        assert_eq!(f.watchdog.process_pending().await, 1);

        let events = f.transport.drain();
        assert_eq!(events[0].user_id, "bob");
        assert!(f.store.state_lock("alice").lock().stats.dead_executions == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_handles_deaths_until_cancelled() {
        let f = fixture();
        running(&f, "alice").await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&f.watchdog).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(f.store.state_lock("alice").lock().stats.dead_executions, 1);
        assert_eq!(f.transport.drain().len(), 1);
    }
}
