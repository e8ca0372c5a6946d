//! Logging initialisation
//!
//! Structured JSON logs go to stdout and to a daily-rolling file.

use time::format_description::well_known::Rfc3339;
use tracing_appender::rolling;
use tracing_subscriber::fmt::format::{Json, JsonFields};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info,gitlab_event_server=debug";

/// Initialise the global tracing subscriber.
///
/// The level is read from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// Log files are written to `LOG_DIR` (default `logs/`) as
/// `server.log.YYYY-MM-DD`.
///
/// Keep the returned `WorkerGuard` alive in main so buffered log lines are
/// flushed on exit.
pub fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());

    let file_appender = rolling::daily(&log_dir, "server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = json_layer();
    let file_layer = json_layer().with_ansi(false).with_writer(non_blocking);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .or_else(|err| {
            use std::error::Error;
            if err
                .source()
                .and_then(|s| s.downcast_ref::<tracing::dispatcher::SetGlobalDefaultError>())
                .is_some()
            {
                // Already initialized
                return Ok(());
            }
            eprintln!("Failed to initialize tracing: {}", err);
            Err(err)
        })
        .ok();

    guard
}

fn json_layer<S>() -> fmt::Layer<S, JsonFields, fmt::format::Format<Json, UtcTime<Rfc3339>>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_current_span(true)
        .with_span_list(false)
        .flatten_event(false)
}
