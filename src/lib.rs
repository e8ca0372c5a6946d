pub mod config;
pub mod domain;
pub mod event;
pub mod processors;
pub mod shutdown;
pub mod state;
pub mod utils;

pub use state::AppState;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        domain::webhook::gitlab_handler::handle_gitlab_webhook,
        domain::webhook::gitlab_handler::list_recent_events,
        domain::webhook::gitlab_handler::get_queue_stats,
        domain::webhook::gitlab_handler::webhook_health,
    ),
    components(
        schemas(
            domain::webhook::dto::WebhookResponse,
            domain::webhook::dto::WebhookStatus,
            domain::webhook::dto::EventsResponse,
            domain::webhook::dto::HealthResponse,
            domain::webhook::dto::HealthStatus,
            event::RecentEvent,
            event::EventType,
            event::Priority,
            event::QueueStats,
            event::QueueSizes,
            event::ProcessingStats,
            event::ProcessorStats,
            utils::response::ErrorResponse,
        )
    ),
    tags(
        (name = "Webhooks", description = "GitLab webhook ingestion and event queue status")
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { "OK" }))
        .nest("/webhooks", domain::webhook::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
