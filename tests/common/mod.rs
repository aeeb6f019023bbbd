// tests/common/mod.rs
//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use agent_engine::agents::{register_builtins, AgentRegistry};
use agent_engine::events::BufferedTransport;
use agent_engine::{
    Agent, AgentError, AgentState, EngineBuilder, EngineConfig, EventNotifier, EventType,
    ExecutionEngine, InMemoryAgentRegistry, TenantContext,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Config tuned for fast tests: short timeout and backoff, no watchdog
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.execution.agent_execution_timeout_ms = 200;
    config.execution.retry_base_delay_ms = 10;
    config.execution.heartbeat_interval_ms = 50;
    config.watchdog.enabled = false;
    config
}

pub fn tenant(user: &str) -> TenantContext {
    TenantContext::new(user, format!("{}-thread", user), format!("{}-run", user), "req-1")
}

pub struct Harness {
    pub engine: ExecutionEngine,
    pub registry: Arc<InMemoryAgentRegistry>,
    pub transport: Arc<BufferedTransport>,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        let transport = Arc::new(BufferedTransport::new(4096));
        let notifier = Arc::new(EventNotifier::new(transport.clone()));
        let registry = Arc::new(InMemoryAgentRegistry::new());
        register_builtins(&registry, Arc::clone(&notifier));

        let engine = EngineBuilder::new()
            .config(config)
            .registry(registry.clone())
            .notifier(notifier)
            .build()
            .unwrap();

        Self {
            engine,
            registry,
            transport,
        }
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.transport.drain().into_iter().map(|e| e.event_type).collect()
    }
}

/// Succeeds, recording its own name in the returned state
pub struct Marker {
    pub name: String,
    pub calls: AtomicU32,
}

impl Marker {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for Marker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        state: AgentState,
        _run_id: String,
        _stream: bool,
    ) -> Result<Option<AgentState>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(state.with(self.name.as_str(), true)))
    }
}

/// Fails `failures` times with a retryable error, then succeeds
pub struct Flaky {
    pub failures: u32,
    pub calls: AtomicU32,
}

impl Flaky {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Agent for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn execute(
        &self,
        state: AgentState,
        _run_id: String,
        _stream: bool,
    ) -> Result<Option<AgentState>, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(AgentError::Llm("upstream returned 503".to_string()))
        } else {
            Ok(Some(state.with("recovered", true)))
        }
    }
}

/// Sleeps while tracking how many copies run at once
pub struct Gauge {
    pub current: AtomicUsize,
    pub max_seen: AtomicUsize,
    pub hold: Duration,
}

impl Gauge {
    pub fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            hold,
        })
    }
}

#[async_trait]
impl Agent for Gauge {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn execute(
        &self,
        state: AgentState,
        _run_id: String,
        _stream: bool,
    ) -> Result<Option<AgentState>, AgentError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(state))
    }
}

/// Registry wrapper counting lookups
pub struct CountingRegistry {
    pub inner: Arc<InMemoryAgentRegistry>,
    pub lookups: AtomicUsize,
}

#[async_trait]
impl AgentRegistry for CountingRegistry {
    async fn get_async(
        &self,
        agent_name: &str,
        context: Option<&TenantContext>,
    ) -> Option<Arc<dyn Agent>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_async(agent_name, context).await
    }
}

/// Registry that panics the first time `poisoned` is looked up
pub struct PanicOnceRegistry {
    pub inner: Arc<InMemoryAgentRegistry>,
    pub poisoned: String,
    pub tripped: AtomicBool,
}

#[async_trait]
impl AgentRegistry for PanicOnceRegistry {
    async fn get_async(
        &self,
        agent_name: &str,
        context: Option<&TenantContext>,
    ) -> Option<Arc<dyn Agent>> {
        if agent_name == self.poisoned && !self.tripped.swap(true, Ordering::SeqCst) {
            panic!("registry backend unavailable");
        }
        self.inner.get_async(agent_name, context).await
    }
}
