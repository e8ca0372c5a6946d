//! Event system module for the webhook processing pipeline
//!
//! This module provides the event processing core:
//! - Event definition and types
//! - Processor contract
//! - Priority queue with worker loops and retry/backoff
//! - Recent-event history and statistics

pub mod history;
pub mod processor;
pub mod queue;
pub mod stats;

mod event_types;

pub use event_types::{generate_event_id, Event, EventType, Priority, DEFAULT_MAX_RETRIES};
pub use history::{EventHistory, RecentEvent};
pub use processor::{EventProcessor, ProcessorCounters, ProcessorError};
pub use queue::{EventQueue, QueueConfig, QueueError, QueueResult, RetryPolicy};
pub use stats::{ProcessingStats, ProcessorStats, QueueSizes, QueueStats};
