use gitlab_event_server::config::AppConfig;
use gitlab_event_server::event::EventQueue;
use gitlab_event_server::processors::{MergeRequestProcessor, NoopAnalyzer, PipelineProcessor};
use gitlab_event_server::shutdown::shutdown_signal;
use gitlab_event_server::utils::logging::init_logging;
use gitlab_event_server::{create_router, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Environment
    dotenvy::dotenv().ok();

    // 2. Logging
    let _log_guard = init_logging();

    // 3. Configuration
    let config = AppConfig::from_env()?;
    let worker_count = config.queue.worker_count;

    // 4. Event queue and processors
    let queue = EventQueue::new(config.queue.clone());
    let analyzer = Arc::new(NoopAnalyzer);
    queue
        .add_processor(Arc::new(MergeRequestProcessor::new(analyzer.clone())))
        .await;
    queue
        .add_processor(Arc::new(PipelineProcessor::new(analyzer)))
        .await;
    queue.start_workers(worker_count).await;

    // 5. Router
    let app = create_router(AppState::new(queue.clone(), config.webhook_secret.clone()));

    // 6. Serve
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, workers = worker_count, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    queue.stop_workers().await;
    tracing::info!("Server stopped");

    Ok(())
}
