// src/agents/registry.rs
//! Agent registry
//!
//! Resolves a logical agent name to an executable agent. Resolution may be
//! tenant-aware: factories receive the tenant context when one is supplied,
//! and must cope when it is not.

use crate::agents::Agent;
use crate::model::TenantContext;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Resolves agents by name
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Resolve `agent_name`, optionally scoped to `context`
    async fn get_async(
        &self,
        agent_name: &str,
        context: Option<&TenantContext>,
    ) -> Option<Arc<dyn Agent>>;
}

/// Builds an agent instance, optionally bound to a tenant
pub type AgentFactory = Arc<dyn Fn(Option<&TenantContext>) -> Arc<dyn Agent> + Send + Sync>;

enum Registration {
    Shared(Arc<dyn Agent>),
    Factory(AgentFactory),
}

/// In-memory registry of shared agents and per-tenant factories
#[derive(Default)]
pub struct InMemoryAgentRegistry {
    agents: DashMap<String, Registration>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one agent instance shared by every tenant
    pub fn register(&self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        debug!(agent = %name, "Registering shared agent");
        self.agents.insert(name, Registration::Shared(agent));
    }

    /// Register a factory producing a fresh agent per resolution
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(Option<&TenantContext>) -> Arc<dyn Agent> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(agent = %name, "Registering agent factory");
        self.agents.insert(name, Registration::Factory(Arc::new(factory)));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.agents.remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn get_async(
        &self,
        agent_name: &str,
        context: Option<&TenantContext>,
    ) -> Option<Arc<dyn Agent>> {
        let entry = self.agents.get(agent_name)?;
        let agent = match entry.value() {
            Registration::Shared(agent) => Arc::clone(agent),
            Registration::Factory(factory) => factory(context),
        };
        Some(agent)
    }
}
