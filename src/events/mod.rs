// src/events/mod.rs
//! Progress event delivery
//!
//! - **Event**: Named event kinds and structured payloads
//! - **Notifier**: Ordered, best-effort delivery with per-run ordering state
//! - **Transport**: Bridge to a tenant's live connection(s)
//! - **Event Queue**: Bounded lock-free buffer behind `BufferedTransport`
//!
//! # Architecture
//!
//! ```text
//! Executor / Agent
//!     │ notify_*(run_id, agent, payload)
//!     ▼
//! TenantNotifier ── ordering check ──▶ EventTransport ──▶ tenant connection(s)
//!                        │
//!                   suppressed / failed counters
//! ```

pub mod event;
pub mod event_queue;
pub mod notifier;
pub mod transport;

pub use event::{AgentEvent, EventType};
pub use event_queue::{BufferedTransport, EventQueue, QueueStats};
pub use notifier::{EventNotifier, NotifierStats, TenantNotifier};
pub use transport::{ChannelTransport, EventTransport};
