// src/state/tenant_store.rs
//! Per-tenant isolated state store
//!
//! Each tenant gets its own lazily created `ExecutionState` behind its own
//! mutex. The map of tenants is guarded by a single creation lock, so
//! concurrent first access for one tenant creates exactly one state.
//!
//! ```text
//! TenantStateStore
//! ├─ "alice" → Arc<Mutex<ExecutionState>>
//! ├─ "bob"   → Arc<Mutex<ExecutionState>>
//! └─ ...
//! ```

use crate::state::execution_state::{ExecutionState, TenantStatsSnapshot};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared handle to one tenant's state; the mutex is the tenant's state lock
pub type TenantStateHandle = Arc<Mutex<ExecutionState>>;

/// Arena of per-tenant execution states
pub struct TenantStateStore {
    /// Tenant id → state; the write lock is the creation mutex
    states: RwLock<HashMap<String, TenantStateHandle>>,

    /// History capacity for newly created states
    history_capacity: usize,

    /// Sample window capacity for newly created states
    sample_capacity: usize,
}

impl TenantStateStore {
    pub fn new(history_capacity: usize, sample_capacity: usize) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            history_capacity,
            sample_capacity,
        }
    }

    /// Get the tenant's state lock, creating it exactly once
    pub fn state_lock(&self, tenant_id: &str) -> TenantStateHandle {
        if let Some(handle) = self.states.read().get(tenant_id) {
            return Arc::clone(handle);
        }

        let mut states = self.states.write();
        // Re-check under the creation lock
        let handle = states.entry(tenant_id.to_string()).or_insert_with(|| {
            debug!(tenant = tenant_id, "Creating execution state");
            Arc::new(Mutex::new(ExecutionState::new(
                self.history_capacity,
                self.sample_capacity,
            )))
        });
        Arc::clone(handle)
    }

    /// Get the tenant's execution state (same handle as its state lock)
    pub fn execution_state(&self, tenant_id: &str) -> TenantStateHandle {
        self.state_lock(tenant_id)
    }

    /// Look up a tenant without creating it
    pub fn get(&self, tenant_id: &str) -> Option<TenantStateHandle> {
        self.states.read().get(tenant_id).map(Arc::clone)
    }

    pub fn contains(&self, tenant_id: &str) -> bool {
        self.states.read().contains_key(tenant_id)
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        self.states.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Stats for every known tenant
    pub fn snapshots(&self) -> Vec<TenantStatsSnapshot> {
        // Clone handles first so tenant locks are never taken under the map lock
        let handles: Vec<(String, TenantStateHandle)> = self
            .states
            .read()
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();

        handles
            .into_iter()
            .map(|(id, handle)| handle.lock().snapshot(&id))
            .collect()
    }

    pub fn remove(&self, tenant_id: &str) -> Option<TenantStateHandle> {
        self.states.write().remove(tenant_id)
    }

    /// Drop every tenant's state
    pub fn clear(&self) {
        let drained: Vec<TenantStateHandle> = self.states.write().drain().map(|(_, h)| h).collect();
        for handle in drained {
            handle.lock().clear();
        }
    }
}

impl Default for TenantStateStore {
    fn default() -> Self {
        Self::new(100, 1_000)
    }
}
