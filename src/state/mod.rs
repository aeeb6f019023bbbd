// src/state/mod.rs
//! Per-tenant state management
//!
//! - **Tenant Store**: Lazily created, mutually isolated per-tenant states
//! - **Execution State**: Active runs, bounded history, counters and samples
//!
//! Distinct tenants never share an `ExecutionState`; isolation is by
//! reference, not just by value.

pub mod execution_state;
pub mod tenant_store;

pub use execution_state::{ActiveRun, ExecutionState, SampleWindow, TenantStats, TenantStatsSnapshot};
pub use tenant_store::{TenantStateHandle, TenantStateStore};
