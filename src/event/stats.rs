//! Queue statistics snapshots

use crate::event::Priority;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use utoipa::ToSchema;

/// Aggregate processing counters
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ProcessingStats {
    pub total_processed: u64,
    /// Counts every failed attempt, retries included
    pub total_failed: u64,
    /// Enqueue count per event type name, retries included
    pub events_by_type: HashMap<String, u64>,
    /// Running mean over all attempts, in seconds
    pub avg_processing_time: f64,
}

impl ProcessingStats {
    pub fn record_enqueued(&mut self, event_type: &str) {
        *self
            .events_by_type
            .entry(event_type.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_attempt(&mut self, success: bool, elapsed: Duration) {
        if success {
            self.total_processed += 1;
        } else {
            self.total_failed += 1;
        }

        let n = (self.total_processed + self.total_failed) as f64;
        self.avg_processing_time =
            (self.avg_processing_time * (n - 1.0) + elapsed.as_secs_f64()) / n;
    }
}

/// Pending events per priority lane
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct QueueSizes {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl QueueSizes {
    pub fn set(&mut self, priority: Priority, size: usize) {
        match priority {
            Priority::Critical => self.critical = size,
            Priority::High => self.high = size,
            Priority::Medium => self.medium = size,
            Priority::Low => self.low = size,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct ProcessorStats {
    pub processed: u64,
    pub failed: u64,
}

/// Full snapshot returned by `EventQueue::get_stats`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueStats {
    pub queue_sizes: QueueSizes,
    pub total_queue_size: usize,
    pub worker_count: usize,
    pub running: bool,
    pub stats: ProcessingStats,
    /// Keyed by the event type each processor claims
    pub processor_stats: HashMap<String, ProcessorStats>,
}
