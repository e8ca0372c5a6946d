//! Processor contract for the event queue
//!
//! A processor claims one [`EventType`] and does the actual work for it.
//! The queue walks its processors in registration order and hands each
//! event to the first one whose `can_process` answers `true`.

use crate::event::{Event, EventType};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unexpected processor failure
///
/// Business-level failures are reported as `Ok(false)` instead.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
    #[error("{0}")]
    Other(String),
}

/// Per-processor attempt counters
///
/// Bumped by the queue after every attempt it dispatched. Several workers
/// may dispatch to the same processor at once, so the counters are atomics.
#[derive(Debug, Default)]
pub struct ProcessorCounters {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl ProcessorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Type-specific event handler
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Event type this processor claims
    fn event_type(&self) -> EventType;

    /// Counters reported through queue stats
    fn counters(&self) -> &ProcessorCounters;

    /// Whether this processor handles the event
    async fn can_process(&self, event: &Event) -> bool {
        event.event_type == self.event_type()
    }

    /// Process an event
    ///
    /// Returns:
    /// - Ok(true) if the event was handled
    /// - Ok(false) for a handled failure (retried by the queue)
    /// - Err for an unexpected failure (also retried, message recorded)
    async fn process(&self, event: &Event) -> Result<bool, ProcessorError>;
}
