//! API error handling with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::{AuthError, ValidationResult};

/// Message returned for every unexpected failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request cannot be acted on as sent.
    #[error("{0}")]
    BadRequest(String),

    /// The token failed verification.
    #[error(transparent)]
    Unauthorized(AuthError),

    /// Anything unexpected. Details are logged, not returned.
    #[error("{}", INTERNAL_ERROR_MESSAGE)]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_kind(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized(err) => Some(err.kind()),
            Self::BadRequest(_) | Self::Internal(_) => None,
        }
    }

    fn log(&self) {
        match self {
            Self::Internal(detail) => {
                error!(message = %detail, "API error");
            }
            Self::Unauthorized(err) => {
                debug!(error_kind = err.kind(), message = %err, "Token rejected");
            }
            Self::BadRequest(message) => {
                debug!(message = %message, "Client error");
            }
        }
    }
}

/// Verification failures are 401s, except internal faults which are 500s.
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Internal(detail) => Self::Internal(detail),
            other => Self::Unauthorized(other),
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let body = ErrorResponse {
            error: self.to_string(),
            error_kind: self.error_kind(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Error on the validate endpoint, whose bodies always carry `isValid: false`.
#[derive(Debug)]
pub struct ValidationRejection(pub ApiError);

impl From<ApiError> for ValidationRejection {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl From<AuthError> for ValidationRejection {
    fn from(err: AuthError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ValidationRejection {
    fn into_response(self) -> Response {
        let err = self.0;
        err.log();

        let body = ValidationResult::invalid(err.to_string(), err.error_kind());
        (err.status_code(), Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
