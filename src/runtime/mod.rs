// src/runtime/mod.rs
//! Agent execution runtime
//!
//! - **Governor**: Engine-wide admission control (counting semaphore)
//! - **Executor**: Single-agent execution with timeout race and retries
//! - **Classification**: Failure kinds, severities, support codes, backoff
//! - **Heartbeat**: Per-execution liveness pings to the tracker
//! - **Watchdog**: Background detection of executions that lost their heartbeat
//! - **Supervisor**: Bounded restarts for background tasks
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  ConcurrencyGovernor (N)               │
//! │   ┌──────────┐  ┌──────────┐  ┌──────────┐             │
//! │   │ Executor │  │ Executor │  │ Executor │  ...        │
//! │   │  task    │  │  task    │  │  task    │             │
//! │   └────┬─────┘  └────┬─────┘  └────┬─────┘             │
//! │        │ heartbeat   │             │                   │
//! │        ▼             ▼             ▼                   │
//! │              ExecutionTracker                          │
//! │                     ▲                                  │
//! │                     │ scan / death callbacks           │
//! │              Watchdog (supervised)                     │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod classification;
pub mod executor;
pub mod governor;
pub mod heartbeat;
pub mod supervisor;
pub mod watchdog;

// Re-export commonly used types
pub use classification::{Classification, Severity};
pub use executor::{validate_context, validate_scope, AgentExecutor};
pub use governor::{Admission, ConcurrencyGovernor};
pub use heartbeat::HeartbeatHandle;
pub use supervisor::{supervise, RestartPolicy};
pub use watchdog::{DeathNotice, DeathReason, Watchdog};
