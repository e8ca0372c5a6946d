//! Classification of raw GitLab webhook payloads
//!
//! Both functions are pure: the same payload always yields the same result.

use crate::event::{EventType, Priority};
use serde_json::Value;

/// Returned by [`determine_event_type`] when nothing identifies the payload
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

const SECURITY_KEYWORDS: [&str; 3] = ["security", "vulnerability", "fix"];

/// Work out the event type name of a webhook payload.
///
/// Checked in order: `object_kind`, `event_type`, then the presence of a
/// `merge_request`, `pipeline` or `commits` key. Falls back to `"unknown"`,
/// which is also the result when a discriminator key holds a non-string.
pub fn determine_event_type(payload: &Value) -> String {
    // A present discriminator decides, even when it is not a string
    let explicit = ["object_kind", "event_type"]
        .iter()
        .find_map(|key| payload.get(*key));
    if let Some(kind) = explicit {
        return kind.as_str().unwrap_or(UNKNOWN_EVENT_TYPE).to_string();
    }

    let inferred = [
        ("merge_request", EventType::MergeRequest),
        ("pipeline", EventType::Pipeline),
        ("commits", EventType::Push),
    ]
    .iter()
    .find(|(key, _)| payload.get(*key).is_some())
    .map(|(_, event_type)| event_type.as_str());

    inferred.unwrap_or(UNKNOWN_EVENT_TYPE).to_string()
}

/// Event types the webhook endpoint hands to the queue
pub const INGESTED_EVENT_TYPES: [EventType; 3] =
    [EventType::MergeRequest, EventType::Pipeline, EventType::Push];

/// Map a type name to an ingestible event type
///
/// Names of other known types (`issue`, `deployment`, ...) yield `None`
/// just like unknown ones.
pub fn ingestible_event_type(name: &str) -> Option<EventType> {
    name.parse::<EventType>()
        .ok()
        .filter(|event_type| INGESTED_EVENT_TYPES.contains(event_type))
}

/// Pick the dispatch priority for a classified payload
pub fn determine_priority(payload: &Value, event_type: EventType) -> Priority {
    match event_type {
        EventType::Pipeline => match attribute(payload, "status") {
            Some("failed") => Priority::High,
            Some("running") | Some("pending") => Priority::Medium,
            _ => Priority::Low,
        },
        EventType::MergeRequest => match attribute(payload, "action") {
            Some("opened") | Some("reopened") => Priority::Medium,
            Some("merged") => Priority::High,
            _ => Priority::Low,
        },
        EventType::Push => {
            if has_security_commit(payload) {
                Priority::High
            } else {
                Priority::Low
            }
        }
        _ => Priority::Low,
    }
}

fn attribute<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get("object_attributes")
        .and_then(|attrs| attrs.get(key))
        .and_then(Value::as_str)
}

fn has_security_commit(payload: &Value) -> bool {
    let Some(commits) = payload.get("commits").and_then(Value::as_array) else {
        return false;
    };

    commits
        .iter()
        .filter_map(|commit| commit.get("message").and_then(Value::as_str))
        .map(str::to_lowercase)
        .any(|message| SECURITY_KEYWORDS.iter().any(|kw| message.contains(kw)))
}
