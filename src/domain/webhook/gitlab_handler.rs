//! GitLab webhook ingestion and queue introspection handlers

use super::classify::{determine_event_type, determine_priority, ingestible_event_type};
use super::dto::{
    EventsQuery, EventsResponse, HealthResponse, WebhookResponse, DEFAULT_EVENTS_LIMIT,
};
use crate::event::{generate_event_id, Event, EventQueue, QueueStats};
use crate::state::AppState;
use crate::utils::{AppError, ErrorResponse};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

pub const GITLAB_TOKEN_HEADER: &str = "X-Gitlab-Token";

/// Check the shared-secret header in constant time
fn verify_gitlab_token(secret: &str, headers: &HeaderMap) -> Result<(), AppError> {
    let token = headers
        .get(GITLAB_TOKEN_HEADER)
        .map(|v| v.as_bytes())
        .ok_or_else(|| AppError::forbidden("Missing X-Gitlab-Token header"))?;

    if bool::from(secret.as_bytes().ct_eq(token)) {
        Ok(())
    } else {
        Err(AppError::forbidden("Invalid webhook token"))
    }
}

fn project_id_of(payload: &Value) -> i64 {
    payload
        .get("project")
        .and_then(|p| p.get("id"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Receive a GitLab webhook
///
/// The payload is classified and checked against lane capacity before
/// answering; the enqueue itself runs on a background task.
#[utoipa::path(
    post,
    path = "/webhooks/gitlab",
    tag = "Webhooks",
    request_body(content = Value, description = "Raw GitLab webhook payload", content_type = "application/json"),
    params(
        ("X-Gitlab-Token" = Option<String>, Header, description = "Shared secret, required when configured")
    ),
    responses(
        (status = 202, description = "Accepted or ignored", body = WebhookResponse),
        (status = 400, description = "Body is not valid JSON", body = ErrorResponse),
        (status = 403, description = "Missing or wrong token", body = ErrorResponse),
        (status = 503, description = "Priority lane is full", body = ErrorResponse)
    )
)]
pub async fn handle_gitlab_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), AppError> {
    if let Some(secret) = state.webhook_secret.as_deref() {
        verify_gitlab_token(secret, &headers).inspect_err(|_| {
            warn!("Rejected GitLab webhook with invalid token");
        })?;
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Failed to parse webhook body");
        AppError::JsonParseFailed(e.to_string())
    })?;

    let event_type_name = determine_event_type(&payload);
    let event_id = generate_event_id(&event_type_name);
    let project_id = project_id_of(&payload);

    info!(
        event_id = %event_id,
        event_type = %event_type_name,
        project_id,
        "Webhook received"
    );

    let Some(event_type) = ingestible_event_type(&event_type_name) else {
        warn!(
            event_id = %event_id,
            event_type = %event_type_name,
            "Unknown event type, dropping webhook"
        );
        return Ok((
            StatusCode::ACCEPTED,
            Json(WebhookResponse::ignored(event_id, event_type_name)),
        ));
    };

    let priority = determine_priority(&payload, event_type);
    state.queue.check_capacity(priority).await?;

    let event = Event::new(event_id.clone(), event_type, priority, project_id, payload)
        .with_max_retries(state.queue.config().max_retries);

    tokio::spawn(enqueue_in_background(state.queue.clone(), event));

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookResponse::accepted(event_id, event_type_name)),
    ))
}

async fn enqueue_in_background(queue: EventQueue, event: Event) {
    let event_id = event.id.clone();
    if let Err(e) = queue.enqueue(event).await {
        error!(event_id = %event_id, error = %e, "Failed to queue webhook event");
    }
}

/// Recent events with the current queue statistics
#[utoipa::path(
    get,
    path = "/webhooks/events",
    tag = "Webhooks",
    params(EventsQuery),
    responses(
        (status = 200, body = EventsResponse)
    )
)]
pub async fn list_recent_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
    let events = state.queue.get_recent_events(limit).await;
    let stats = state.queue.get_stats().await;

    Json(EventsResponse { events, stats })
}

/// Raw queue statistics
#[utoipa::path(
    get,
    path = "/webhooks/queue/stats",
    tag = "Webhooks",
    responses(
        (status = 200, body = QueueStats)
    )
)]
pub async fn get_queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.queue.get_stats().await)
}

/// Health of the event processing system
#[utoipa::path(
    get,
    path = "/webhooks/health",
    tag = "Webhooks",
    responses(
        (status = 200, body = HealthResponse)
    )
)]
pub async fn webhook_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.queue.get_stats().await;
    Json(HealthResponse::from(&stats))
}
