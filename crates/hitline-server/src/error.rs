use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use hitline_core::error::SessionError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// Request was valid but no device could carry it out.
    Upstream(String),
    Unavailable(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Upstream(m)
            | Self::Unavailable(m)
            | Self::Internal(m) => write!(f, "{m}"),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::Validation(_) => Self::BadRequest(message),
            SessionError::State(_) => Self::Conflict(message),
            SessionError::AllDevicesFailed { .. } => Self::Upstream(message),
            SessionError::Finalize(_) => Self::Conflict(message),
            SessionError::Persistence(_) => Self::Internal(message),
            SessionError::CoordinatorGone => Self::Unavailable(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitline_core::error::{StateError, ValidationError};
    use hitline_core::lifecycle::Lifecycle;

    fn status_of(err: SessionError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn session_errors_map_to_status_codes() {
        assert_eq!(
            status_of(ValidationError::EmptyRoster.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(StateError::SessionActive(Lifecycle::Running).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(SessionError::CoordinatorGone),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
