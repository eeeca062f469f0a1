//! Error types for the Tickbook server.
//!
//! [`ServerError`] is the error every handler returns. It renders as a JSON
//! [`ErrorResponse`] with a status code chosen per variant, so handlers can
//! use `?` on core and configuration errors directly.
//!
//! # Example
//!
//! ```rust
//! use tickbook_server::error::ServerError;
//!
//! fn require_line(line_number: usize) -> Result<usize, ServerError> {
//!     if line_number == 0 {
//!         return Err(ServerError::validation("line_number is 1-based"));
//!     }
//!     Ok(line_number)
//! }
//!
//! assert!(require_line(0).is_err());
//! ```

use std::error::Error;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tickbook_core::{CoreError, ToggleError};
use tracing::error;

use crate::config::ConfigError;

/// JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Top-level error type for the Tickbook server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error during startup.
    Config(ConfigError),

    /// Reading or writing a notes file failed.
    Core(CoreError),

    /// The addressed todo, file or line does not exist.
    NotFound(String),

    /// The request was well-formed JSON but not acceptable.
    Validation(String),

    /// Unexpected failure, such as a panicked blocking task.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Core(err) => write!(f, "{err}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::Internal(msg) => write!(f, "internal server error: {msg}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Core(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<ToggleError> for ServerError {
    fn from(err: ToggleError) -> Self {
        match err {
            ToggleError::MalformedLine { .. } => Self::Validation(err.to_string()),
            ToggleError::Io(core) => Self::Core(core),
        }
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {err}"))
    }
}

impl ServerError {
    /// Creates a new not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a new validation error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tickbook_server::error::ServerError;
    ///
    /// let err = ServerError::validation("path is outside the notes directory");
    /// assert!(matches!(err, ServerError::Validation(_)));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Core(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Core(_) => "io_error",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = ErrorResponse::new(self.to_string()).with_code(self.code());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            ServerError::not_found("todo abc").to_string(),
            "not found: todo abc"
        );
        assert_eq!(
            ServerError::validation("bad").to_string(),
            "validation error: bad"
        );
        assert_eq!(
            ServerError::internal("boom").to_string(),
            "internal server error: boom"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ServerError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn malformed_line_maps_to_validation() {
        let err: ServerError = ToggleError::MalformedLine {
            path: PathBuf::from("/n/a.md"),
            line_number: 2,
        }
        .into();
        assert!(matches!(err, ServerError::Validation(_)));
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn toggle_io_maps_to_core() {
        let core = CoreError::io(
            "/n/a.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let err: ServerError = ToggleError::Io(core).into();
        assert!(matches!(err, ServerError::Core(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.source().is_some());
    }

    #[test]
    fn config_error_has_source() {
        let err: ServerError = ConfigError::ValidationError("nope".to_string()).into();
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "configuration error: configuration validation failed: nope"
        );
    }

    #[test]
    fn error_response_skips_missing_code() {
        let json = serde_json::to_value(ErrorResponse::new("oops")).unwrap();
        assert_eq!(json, serde_json::json!({"error": "oops"}));

        let json = serde_json::to_value(ErrorResponse::new("oops").with_code("x")).unwrap();
        assert_eq!(json["code"], "x");
    }

    #[tokio::test]
    async fn into_response_renders_json() {
        let response = ServerError::not_found("todo 123").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error, "not found: todo 123");
        assert_eq!(parsed.code.as_deref(), Some("not_found"));
    }
}
