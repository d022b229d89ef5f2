//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{DomainError, ErrorCode};
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    /// The stable code clients see for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            AppError::Domain(err) => err.code(),
            AppError::Store(_) | AppError::Internal(_) | AppError::Config(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// The domain error, if this is one
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// HTTP status for an error code
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        // 400 Bad Request
        ErrorCode::InvalidRequest
        | ErrorCode::AlreadyUnregistered
        | ErrorCode::BalanceNotEmpty
        | ErrorCode::MaxAccountsPerUser
        | ErrorCode::AmountExceedsBalance
        | ErrorCode::TransactionAccountMismatch
        | ErrorCode::CancelMustBeFull
        | ErrorCode::TransactionAlreadyCanceled
        | ErrorCode::CancelTargetMustBeUse
        | ErrorCode::CancelTargetMustSucceed => StatusCode::BAD_REQUEST,

        // 403 Forbidden
        ErrorCode::OwnerMismatch => StatusCode::FORBIDDEN,

        // 404 Not Found
        ErrorCode::UserNotFound | ErrorCode::AccountNotFound | ErrorCode::TransactionNotFound => {
            StatusCode::NOT_FOUND
        }

        // 409 Conflict
        ErrorCode::AccountNumberAlreadyExists
        | ErrorCode::AccountCreationLocked
        | ErrorCode::AccountModificationLocked => StatusCode::CONFLICT,

        // 500 Internal Server Error
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();

        let (error, details) = match &self {
            AppError::InvalidRequest(msg) => (code.description().to_string(), Some(msg.clone())),
            AppError::Domain(err) => {
                tracing::warn!(error_code = %code, "{}", err);
                (err.to_string(), None)
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (code.description().to_string(), None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (code.description().to_string(), None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (code.description().to_string(), None)
            }
        };

        let body = ErrorResponse {
            error,
            error_code: code,
            details,
        };

        (status_for(code), Json(body)).into_response()
    }
}
