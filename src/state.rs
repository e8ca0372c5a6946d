use crate::event::EventQueue;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub queue: EventQueue,
    /// Expected `X-Gitlab-Token`; None skips verification
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(queue: EventQueue, webhook_secret: Option<String>) -> Self {
        Self {
            queue,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }
}
