//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::store::StoreError;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Validation Errors**: malformed or missing request fields
/// - **Authentication Errors**: missing, invalid, expired or revoked credentials.
///   Every cause collapses into the same `Unauthenticated` value so callers
///   cannot tell which guess was closer.
/// - **Authorization Errors**: authenticated but disallowed actions
/// - **Resource Errors**: requested resources not found or already taken
/// - **Infrastructure Errors**: store or signing failures, never exposed in detail
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("{0}")]
    InvalidInput(String),

    /// Credential is missing, invalid, expired or revoked.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("unauthorized")]
    Unauthenticated,

    /// Login failed. Unknown email and wrong password produce the same value.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Authenticated but not allowed to perform the action.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("{0}")]
    Forbidden(String),

    /// Unique constraint violated (e.g. duplicate email).
    ///
    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    Conflict(String),

    /// Requested resource does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("not found")]
    NotFound,

    /// Per-client request budget exhausted.
    ///
    /// Returns HTTP 429 Too Many Requests.
    #[error("too many requests")]
    RateLimited,

    /// Store operation failed (e.g., connection error, query error).
    ///
    /// Returns HTTP 500; the wrapped error is logged, never sent to the client.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Any other infrastructure failure (token signing, password hashing).
    ///
    /// Returns HTTP 500; the message is logged, never sent to the client.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidInput` → 400 Bad Request
/// - `Unauthenticated`, `InvalidCredentials` → 401 Unauthorized
/// - `Forbidden` → 403 Forbidden
/// - `NotFound` → 404 Not Found
/// - `Conflict` → 409 Conflict
/// - `RateLimited` → 429 Too Many Requests
/// - `Store`, `Internal` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidInput(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_input", msg.clone())
            }
            AppError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", self.to_string())
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                self.to_string(),
            ),
            AppError::Forbidden(ref msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                self.to_string(),
            ),
            AppError::Store(ref err) => {
                tracing::error!(error = %err, "store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Unreadable request bodies: bad syntax, wrong types, missing content type.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), reason = %rejection.body_text(), "rejected request body");
        AppError::InvalidInput("invalid json".to_string())
    }
}
