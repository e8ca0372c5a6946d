use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use super::response::ErrorResponse;
use crate::event::QueueError;

/// Application-wide HTTP error type
#[derive(Debug)]
pub enum AppError {
    Forbidden(String),
    ServiceUnavailable(String),
    JsonParseFailed(String),
}

impl AppError {
    pub fn message(&self) -> String {
        match self {
            AppError::Forbidden(msg) => msg.clone(),
            AppError::ServiceUnavailable(msg) => msg.clone(),
            AppError::JsonParseFailed(msg) => format!("Invalid JSON body: {}", msg),
        }
    }

    pub fn error_code(&self) -> String {
        match self {
            AppError::Forbidden(_) => "COMMON403",
            AppError::ServiceUnavailable(_) => "COMMON503",
            AppError::JsonParseFailed(_) => "COMMON400",
        }
        .to_string()
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::JsonParseFailed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.message();

        if status.is_server_error() {
            error!(code = %error_code, "Request failed: {}", message);
        } else {
            warn!(code = %error_code, "Request rejected: {}", message);
        }

        let error_response = ErrorResponse::new(error_code, message);

        (status, Json(error_response)).into_response()
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full { .. } => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}

impl AppError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }
}
