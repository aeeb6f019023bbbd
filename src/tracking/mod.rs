// src/tracking/mod.rs
//! Execution lifecycle tracking
//!
//! The tracker records state transitions (created/started/failed/timed-out/
//! completed) and heartbeat liveness so stuck executions can be detected.

pub mod tracker;

pub use tracker::{
    ExecutionRecord, ExecutionTracker, InMemoryExecutionTracker, LifecycleCallback, TrackedState,
};
