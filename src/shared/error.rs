//! Application Error Types
//!
//! Centralized error handling with Axum integration.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error taxonomy shared by every service.
///
/// Each service error projects onto exactly one kind, which decides the
/// HTTP status and the gateway `error` event wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    InvalidState,
    ValidationFailed,
    Internal,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Build an error of the given kind carrying a client-facing message.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Forbidden => AppError::Forbidden(message),
            ErrorKind::Conflict => AppError::Conflict(message),
            ErrorKind::InvalidState => AppError::InvalidState(message),
            ErrorKind::ValidationFailed => AppError::Validation(message),
            ErrorKind::Internal => AppError::Internal(message),
        }
    }

    /// Project onto the shared taxonomy. `Unauthorized` never reaches the
    /// core, it is reported as `Forbidden`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unauthorized(_) | AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::InvalidState(_) => ErrorKind::InvalidState,
            AppError::Validation(_) => ErrorKind::ValidationFailed,
            AppError::Internal(_) | AppError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Text safe to hand to a client. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidState(msg)
            | AppError::Validation(msg) => msg.clone(),
            AppError::Internal(_) | AppError::Database(_) => "Internal server error".into(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// Field-level validation error
#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, 10001, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 10003, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, 10004, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, 10005, msg.clone()),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, 10006, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, 10007, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
        };

        let body = ErrorResponse {
            code,
            message,
            errors: None,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ErrorKind::NotFound, StatusCode::NOT_FOUND)]
    #[test_case(ErrorKind::Forbidden, StatusCode::FORBIDDEN)]
    #[test_case(ErrorKind::Conflict, StatusCode::CONFLICT)]
    #[test_case(ErrorKind::InvalidState, StatusCode::CONFLICT)]
    #[test_case(ErrorKind::ValidationFailed, StatusCode::BAD_REQUEST)]
    #[test_case(ErrorKind::Internal, StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_kind_maps_to_status(kind: ErrorKind, expected: StatusCode) {
        assert_eq!(kind.status(), expected);
        assert_eq!(AppError::from_kind(kind, "x").into_response().status(), expected);
    }

    #[test]
    fn test_from_kind_preserves_kind() {
        let err = AppError::from_kind(ErrorKind::Conflict, "duplicate");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Conflict: duplicate");
    }

    #[test]
    fn test_unauthorized_projects_to_forbidden() {
        assert_eq!(
            AppError::Unauthorized("no token".into()).kind(),
            ErrorKind::Forbidden
        );
    }
}
