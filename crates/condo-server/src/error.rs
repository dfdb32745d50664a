use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use condo_core::CondoError;

/// Carries an explicit 400 through the `anyhow::Error` chain for request
/// problems that are not a `CondoError` (bad params, unknown method).
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

/// Unified error type for HTTP responses. The body is always
/// `{"ok": false, "error": "..."}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<CondoError>() {
            Some(e) => match e {
                CondoError::NotInitialized
                | CondoError::MissingField(_)
                | CondoError::InvalidId(_)
                | CondoError::InvalidStatus(_)
                | CondoError::InvalidAutonomyMode(_)
                | CondoError::InvalidDependency(_) => StatusCode::BAD_REQUEST,
                CondoError::CondoNotFound(_)
                | CondoError::GoalNotFound(_)
                | CondoError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
                CondoError::InvalidTransition { .. } | CondoError::GoalIncomplete { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                CondoError::VersionConflict { .. } => StatusCode::CONFLICT,
                CondoError::Io(_) | CondoError::Yaml(_) | CondoError::Json(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "ok": false, "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
