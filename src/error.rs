// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Every business-rule failure of the engine maps to exactly one variant so the
/// host can tell "already submitted" apart from "exam not open".
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error (store or other transient failure)
    InternalServerError(String),

    // 401 Unauthorized (missing or invalid token)
    AuthError(String),

    // 403 Forbidden (actor lacks ownership or role)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 400 Bad Request (malformed answers, bad exam window, ...)
    ValidationError(String),

    // 409 Conflict: move not in the lifecycle table
    InvalidTransition(String),

    // 409 Conflict: lost a compare-and-swap race
    TransitionConflict(String),

    // 409 Conflict: exam exists but is not accepting submissions
    NotPublished(String),

    // 409 Conflict: exam is published but `now` is outside its window
    OutsideWindow(String),

    // 409 Conflict: duplicate intake for the same student
    AlreadySubmitted(String),

    // 409 Conflict: target is in a terminal or locked state
    Immutable(String),
}

impl AppError {
    /// Stable identifier rendered next to the message in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::AuthError(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation_error",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::TransitionConflict(_) => "transition_conflict",
            AppError::NotPublished(_) => "not_published",
            AppError::OutsideWindow(_) => "outside_window",
            AppError::AlreadySubmitted(_) => "already_submitted",
            AppError::Immutable(_) => "immutable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition(_)
            | AppError::TransitionConflict(_)
            | AppError::NotPublished(_)
            | AppError::OutsideWindow(_)
            | AppError::AlreadySubmitted(_)
            | AppError::Immutable(_) => StatusCode::CONFLICT,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let error_message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::ValidationError(msg)
            | AppError::InvalidTransition(msg)
            | AppError::TransitionConflict(msg)
            | AppError::NotPublished(msg)
            | AppError::OutsideWindow(msg)
            | AppError::AlreadySubmitted(msg)
            | AppError::Immutable(msg) => msg,
        };
        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            AppError::InternalServerError(String::new()),
            AppError::AuthError(String::new()),
            AppError::Forbidden(String::new()),
            AppError::NotFound(String::new()),
            AppError::ValidationError(String::new()),
            AppError::InvalidTransition(String::new()),
            AppError::TransitionConflict(String::new()),
            AppError::NotPublished(String::new()),
            AppError::OutsideWindow(String::new()),
            AppError::AlreadySubmitted(String::new()),
            AppError::Immutable(String::new()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_already_submitted_is_conflict() {
        let err = AppError::AlreadySubmitted("dup".to_string());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
