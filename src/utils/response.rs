use serde::Serialize;
use utoipa::ToSchema;

/// Error response body
///
/// ```json
/// {
///   "isSuccess": false,
///   "code": "COMMON403",
///   "message": "Invalid webhook token",
///   "result": null
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub is_success: bool,
    pub code: String,
    pub message: String,
    pub result: Option<()>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            code: code.into(),
            message: message.into(),
            result: None,
        }
    }
}
