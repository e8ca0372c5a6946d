//! Bounded, expiring history of recently touched events
//!
//! Used for introspection only. Every write moves the entry to the back
//! and refreshes its expiry; reads evict expired entries first.

use crate::event::{Event, EventType, Priority};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Snapshot returned by [`EventHistory::recent`]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub priority: Priority,
    pub project_id: i64,
    pub created_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// None while the event has not finished an attempt yet
    pub success: Option<bool>,
    /// Seconds spent in the last attempt
    pub processing_time: Option<f64>,
    pub retry_count: u32,
    pub error_message: Option<String>,
}

#[derive(Debug)]
struct Entry {
    event: Event,
    queued_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    success: Option<bool>,
    processing_time: Option<f64>,
    touched_at: Instant,
}

#[derive(Debug)]
pub struct EventHistory {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, Entry>,
    /// Ids from least to most recently touched
    order: VecDeque<String>,
}

impl EventHistory {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Insert or refresh the entry for a (re-)enqueued event
    pub fn record_enqueued(&mut self, event: &Event) {
        self.evict_expired();
        if self.capacity == 0 {
            return;
        }

        let now = Instant::now();
        match self.entries.get_mut(&event.id) {
            Some(entry) => {
                entry.event = event.clone();
                entry.queued_at = Utc::now();
                entry.touched_at = now;
            }
            None => {
                self.entries.insert(
                    event.id.clone(),
                    Entry {
                        event: event.clone(),
                        queued_at: Utc::now(),
                        processed_at: None,
                        success: None,
                        processing_time: None,
                        touched_at: now,
                    },
                );
            }
        }
        self.move_to_back(&event.id);

        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Record the result of one processing attempt
    ///
    /// Events that already fell out of the history are not re-added.
    pub fn record_outcome(&mut self, event: &Event, success: bool, processing_time: Duration) {
        self.evict_expired();
        let Some(entry) = self.entries.get_mut(&event.id) else {
            return;
        };

        entry.event = event.clone();
        entry.processed_at = Some(Utc::now());
        entry.success = Some(success);
        entry.processing_time = Some(processing_time.as_secs_f64());
        entry.touched_at = Instant::now();
        self.move_to_back(&event.id);
    }

    /// Up to `limit` entries, most recently touched first
    pub fn recent(&mut self, limit: usize) -> Vec<RecentEvent> {
        self.evict_expired();
        self.order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.entries.get(id))
            .map(|entry| RecentEvent {
                id: entry.event.id.clone(),
                event_type: entry.event.event_type,
                priority: entry.event.priority,
                project_id: entry.event.project_id,
                created_at: entry.event.created_at,
                queued_at: entry.queued_at,
                processed_at: entry.processed_at,
                success: entry.success,
                processing_time: entry.processing_time,
                retry_count: entry.event.retry_count,
                error_message: entry.event.error_message.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn move_to_back(&mut self, id: &str) {
        if let Some(pos) = self.order.iter().position(|existing| existing == id) {
            self.order.remove(pos);
        }
        self.order.push_back(id.to_string());
    }

    fn evict_expired(&mut self) {
        // order is sorted by touched_at, so expired ids sit at the front
        while let Some(id) = self.order.front() {
            let expired = self
                .entries
                .get(id)
                .map(|entry| entry.touched_at.elapsed() >= self.ttl)
                .unwrap_or(true);
            if !expired {
                break;
            }
            if let Some(id) = self.order.pop_front() {
                self.entries.remove(&id);
            }
        }
    }
}
