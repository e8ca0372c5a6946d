//! Event structure and related types for the webhook processing pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Default number of retries after the first failed attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Kind of work an event represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MergeRequest,
    Pipeline,
    Push,
    Issue,
    Deployment,
    BuildFailure,
    VulnerabilityDetected,
}

impl EventType {
    /// Wire name used in webhook payloads and stats keys
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MergeRequest => "merge_request",
            EventType::Pipeline => "pipeline",
            EventType::Push => "push",
            EventType::Issue => "issue",
            EventType::Deployment => "deployment",
            EventType::BuildFailure => "build_failure",
            EventType::VulnerabilityDetected => "vulnerability_detected",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge_request" => Ok(EventType::MergeRequest),
            "pipeline" => Ok(EventType::Pipeline),
            "push" => Ok(EventType::Push),
            "issue" => Ok(EventType::Issue),
            "deployment" => Ok(EventType::Deployment),
            "build_failure" => Ok(EventType::BuildFailure),
            "vulnerability_detected" => Ok(EventType::VulnerabilityDetected),
            other => Err(format!("unsupported event type: {}", other)),
        }
    }
}

/// Event priority levels
/// Higher values are dispatched first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    /// Order in which workers look at the sub-queues
    pub const DISPATCH_ORDER: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// Numeric rank (low=1 .. critical=4)
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work flowing through the priority queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID, preserved across retries
    pub id: String,
    pub event_type: EventType,
    pub priority: Priority,
    /// Owning GitLab project
    pub project_id: i64,
    /// Raw webhook payload, interpreted only by processors
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub processed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    /// Last failure reason
    pub error_message: Option<String>,
}

impl Event {
    /// Create a new event with a caller-supplied id
    pub fn new(
        id: impl Into<String>,
        event_type: EventType,
        priority: Priority,
        project_id: i64,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            event_type,
            priority,
            project_id,
            data,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            processed_at: None,
            failed_at: None,
            error_message: None,
        }
    }

    /// Create a new event with a generated `{type}_{8 chars}` id
    pub fn generated(
        event_type: EventType,
        priority: Priority,
        project_id: i64,
        data: serde_json::Value,
    ) -> Self {
        Self::new(
            generate_event_id(event_type.as_str()),
            event_type,
            priority,
            project_id,
            data,
        )
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether another attempt is allowed after a failure
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn mark_processed(&mut self) {
        self.processed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, reason: Option<String>) {
        self.failed_at = Some(Utc::now());
        if reason.is_some() {
            self.error_message = reason;
        }
    }
}

/// Build an event id of the form `{prefix}_{first 8 chars of a v4 uuid}`
pub fn generate_event_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &uuid[..8])
}
