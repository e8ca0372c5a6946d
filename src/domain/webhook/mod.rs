//! GitLab webhook ingestion and event queue introspection

pub mod classify;
pub mod dto;
pub mod gitlab_handler;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub use gitlab_handler::{
    get_queue_stats, handle_gitlab_webhook, list_recent_events, webhook_health,
};

/// Routes mounted under `/webhooks`
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/gitlab", post(handle_gitlab_webhook))
        .route("/events", get(list_recent_events))
        .route("/queue/stats", get(get_queue_stats))
        .route("/health", get(webhook_health))
}
