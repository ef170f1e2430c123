// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use boardsync_common::api::ErrorBody;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Room, permalink or teacher does not exist or is inactive
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid admin credential / teacher token
    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Backing persistence is unreachable or not configured
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A uniqueness constraint lost a race against a concurrent writer
    #[error("Constraint conflict: {0}")]
    ConstraintConflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ConstraintConflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Io(_) | AppError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden => "forbidden",
            AppError::InvalidPayload(_) => "invalid_payload",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::ConstraintConflict(_) => "conflict",
            AppError::Internal(_) | AppError::Io(_) | AppError::Json(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        // Details only in development; forbidden never says why
        let message = if cfg!(debug_assertions) && !matches!(self, AppError::Forbidden) {
            Some(self.to_string())
        } else {
            None
        };

        let body = ErrorBody {
            error: self.error_code().to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("row".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::ConstraintConflict(db.message().to_string())
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AppError::StoreUnavailable(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}
