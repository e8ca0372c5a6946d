//! Request and response bodies of the webhook API

use crate::event::{QueueStats, RecentEvent};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_EVENTS_LIMIT: usize = 10;

/// Outcome of a webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    /// Classified and handed to the queue
    Accepted,
    /// Not a recognized event type, dropped
    Ignored,
}

/// Response body of `POST /webhooks/gitlab`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    pub status: WebhookStatus,
    pub event_id: String,
    pub event_type: String,
}

impl WebhookResponse {
    pub fn accepted(event_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            status: WebhookStatus::Accepted,
            event_id: event_id.into(),
            event_type: event_type.into(),
        }
    }

    pub fn ignored(event_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            status: WebhookStatus::Ignored,
            event_id: event_id.into(),
            event_type: event_type.into(),
        }
    }
}

/// Query of `GET /webhooks/events`
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Maximum number of events to return (default 10)
    pub limit: Option<usize>,
}

/// Response body of `GET /webhooks/events`
#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    pub events: Vec<RecentEvent>,
    pub stats: QueueStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Stopped,
}

/// Response body of `GET /webhooks/health`
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub queue_size: usize,
    pub workers: usize,
    pub total_processed: u64,
    pub total_failed: u64,
}

impl From<&QueueStats> for HealthResponse {
    fn from(stats: &QueueStats) -> Self {
        Self {
            status: if stats.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Stopped
            },
            queue_size: stats.total_queue_size,
            workers: stats.worker_count,
            total_processed: stats.stats.total_processed,
            total_failed: stats.stats.total_failed,
        }
    }
}
