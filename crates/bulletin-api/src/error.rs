use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use bulletin_types::api::{ErrorBody, TokenKind};

/// Every failure the auth and reconciliation core can report.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("user id or password does not match")]
    InvalidCredentials,
    #[error("token has expired")]
    TokenExpired,
    #[error("expected {expected} token")]
    WrongTokenKind { expected: TokenKind },
    #[error("token subject no longer exists")]
    IdentityNotFound,
    #[error("invalid token")]
    InvalidToken,
    #[error("{0}")]
    Forbidden(String),
    #[error("source file missing: {}", .0.display())]
    SourceFileMissing(PathBuf),
    #[error("board {0} not found")]
    BoardNotFound(i64),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials
            | ApiError::TokenExpired
            | ApiError::WrongTokenKind { .. }
            | ApiError::IdentityNotFound
            | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BoardNotFound(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::SourceFileMissing(_) | ApiError::Io(_) | ApiError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Storage(anyhow::anyhow!("spawn_blocking join error: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server-side failures are logged in full and reported generically.
        let message = if status.is_server_error() {
            error!("{}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            timestamp: chrono::Utc::now(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            path: String::new(),
        };

        (status, Json(body)).into_response()
    }
}
