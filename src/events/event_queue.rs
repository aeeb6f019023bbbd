// src/events/event_queue.rs
//! Lock-free bounded event buffer
//!
//! Backs `BufferedTransport`, which records every delivered event for later
//! draining (tests, replay, batch forwarding). When the buffer is full the
//! event is dropped and the send reports a transport failure.

use crate::events::event::AgentEvent;
use crate::events::transport::EventTransport;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free event queue
pub struct EventQueue {
    /// Underlying bounded queue
    queue: ArrayQueue<AgentEvent>,

    /// Push counter
    push_count: AtomicU64,

    /// Pop counter
    pop_count: AtomicU64,

    /// Drop counter (queue full)
    drop_count: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
        }
    }

    /// Push an event (non-blocking); hands the event back when full
    pub fn push(&self, event: AgentEvent) -> std::result::Result<(), AgentEvent> {
        match self.queue.push(event) {
            Ok(()) => {
                self.push_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(event) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
                Err(event)
            }
        }
    }

    pub fn try_pop(&self) -> Option<AgentEvent> {
        let event = self.queue.pop()?;
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    /// Pop everything currently buffered, in push order
    pub fn drain(&self) -> Vec<AgentEvent> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.try_pop() {
            events.push(event);
        }
        events
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

/// Queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub push_count: u64,
    pub pop_count: u64,
    pub drop_count: u64,
    pub current_size: usize,
    pub capacity: usize,
}

impl QueueStats {
    pub fn fill_percentage(&self) -> f64 {
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }

    pub fn drop_rate(&self) -> f64 {
        let attempts = self.push_count + self.drop_count;
        if attempts == 0 {
            0.0
        } else {
            (self.drop_count as f64 / attempts as f64) * 100.0
        }
    }
}

/// Transport that buffers every event in a bounded lock-free queue
pub struct BufferedTransport {
    queue: EventQueue,
}

impl BufferedTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: EventQueue::new(capacity),
        }
    }

    pub fn drain(&self) -> Vec<AgentEvent> {
        self.queue.drain()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

#[async_trait]
impl EventTransport for BufferedTransport {
    async fn send(&self, _user_id: &str, event: &AgentEvent) -> Result<()> {
        self.queue
            .push(event.clone())
            .map_err(|_| EngineError::Transport("event buffer full".to_string()))
    }
}
