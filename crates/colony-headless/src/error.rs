//! Maps `colony_core::CoreError` onto HTTP status codes at the one seam
//! the core is allowed to know nothing about (§7 "Rust realisation").
//! Action handlers mostly report outcomes through the audit log and a
//! bool/`Option`, not `CoreError` — this wrapper exists for the smaller set
//! of hard failures (session lifecycle, scenario resolution) that do
//! bubble up as `Result`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use colony_core::CoreError;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::SessionBusy(_) => StatusCode::CONFLICT,
            CoreError::InvalidState(_) | CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.0.label(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Shorthand for the common "404 if missing" shape used by the substate
/// and workload lookup routes.
pub fn not_found(what: &str) -> ApiError {
    ApiError(CoreError::NotFound(what.to_string()))
}

pub fn invalid_request(what: &str) -> ApiError {
    ApiError(CoreError::InvalidRequest(what.to_string()))
}
