//! Error handling.

use std::error::Error as StdError;

use anyhow::Error as AnyError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use displaydoc::Display;
use serde::Serialize;

use reel::error::ReelError;

pub type ServerResult<T> = Result<T, ServerError>;

/// An error.
#[derive(Debug, Display)]
pub enum ServerError {
    // Generic responses
    /// The URL you requested was not found.
    NotFound,

    /// Unauthorized.
    Unauthorized,

    /// The server encountered an internal error or misconfiguration.
    InternalServerError,

    // Upload protocol responses
    /// The file exceeds the maximum allowed size.
    FileTooLarge,

    /// No upload session exists for this file ID.
    InvalidSession,

    /// An upload session already exists for this file ID.
    SessionAlreadyExists,

    /// Invalid request body: {0}
    InvalidRequestBody(AnyError),

    // Media responses
    /// The duration must be a positive number of seconds.
    InvalidDuration,

    /// The duration exceeds the maximum trim length.
    DurationTooLong,

    /// The requested range is outside the video.
    InvalidTrimRange,

    /// Could not read video information: {0}
    VideoInfoError(AnyError),

    /// Trimming failed: {0}
    TrimError(AnyError),

    /// Joining failed: {0}
    JoinError(AnyError),

    // Infrastructure
    /// Session store error: {0}
    SessionStoreError(AnyError),

    /// The stored session record could not be decoded: {0}
    CorruptSession(AnyError),

    /// Database error: {0}
    DatabaseError(AnyError),

    /// Storage error: {0}
    StorageError(AnyError),

    /// Assembly of the final file failed: {0}
    AssemblyError(AnyError),

    /// Search indexer error: {0}
    IndexerError(AnyError),

    /// {0}
    ReelError(ReelError),
}

/// The JSON body of an error response.
#[derive(Serialize)]
pub struct ErrorResponse {
    status: &'static str,
    error: String,
    code: u16,
}

impl ServerError {
    pub fn session_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::SessionStoreError(AnyError::new(error))
    }

    pub fn database_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::DatabaseError(AnyError::new(error))
    }

    pub fn storage_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::StorageError(AnyError::new(error))
    }

    pub fn assembly_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::AssemblyError(AnyError::new(error))
    }

    pub fn indexer_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::IndexerError(AnyError::new(error))
    }

    /// Returns a version of this error for clients.
    ///
    /// Infrastructure details are not the client's business.
    fn into_clients(self) -> Self {
        match self {
            Self::SessionStoreError(_) => Self::InternalServerError,
            Self::CorruptSession(_) => Self::InternalServerError,
            Self::DatabaseError(_) => Self::InternalServerError,
            Self::StorageError(_) => Self::InternalServerError,
            Self::AssemblyError(_) => Self::InternalServerError,
            Self::IndexerError(_) => Self::InternalServerError,
            Self::ReelError(ReelError::IoError { .. }) => Self::InternalServerError,

            _ => self,
        }
    }

    fn http_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,

            Self::FileTooLarge => StatusCode::BAD_REQUEST,
            Self::InvalidSession => StatusCode::BAD_REQUEST,
            Self::SessionAlreadyExists => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,

            Self::InvalidDuration => StatusCode::BAD_REQUEST,
            Self::DurationTooLong => StatusCode::BAD_REQUEST,
            Self::InvalidTrimRange => StatusCode::BAD_REQUEST,
            Self::VideoInfoError(_) => StatusCode::BAD_REQUEST,
            Self::TrimError(_) => StatusCode::BAD_REQUEST,
            Self::JoinError(_) => StatusCode::BAD_REQUEST,

            Self::ReelError(e) => match e {
                ReelError::IoError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl StdError for ServerError {}

impl From<ReelError> for ServerError {
    fn from(error: ReelError) -> Self {
        Self::ReelError(error)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if matches!(
            self,
            Self::SessionStoreError(_)
                | Self::CorruptSession(_)
                | Self::DatabaseError(_)
                | Self::StorageError(_)
                | Self::AssemblyError(_)
        ) {
            tracing::error!("{:?}", self);
        }

        let sanitized = self.into_clients();

        let status_code = sanitized.http_status_code();
        let error_response = ErrorResponse {
            status: "error",
            error: sanitized.to_string(),
            code: status_code.as_u16(),
        };

        (status_code, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServerError::Unauthorized.http_status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServerError::FileTooLarge.http_status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServerError::InvalidSession.http_status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::AssemblyError(anyhow::anyhow!("missing chunk")).http_status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::ReelError(ReelError::ChunkIndexOutOfRange {
                index: 9,
                total_chunks: 3,
            })
            .http_status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_infrastructure_errors_are_sanitized() {
        let sanitized =
            ServerError::DatabaseError(anyhow::anyhow!("secret dsn in message")).into_clients();
        assert!(matches!(sanitized, ServerError::InternalServerError));

        // client protocol errors keep their message
        let kept = ServerError::FileTooLarge.into_clients();
        assert!(matches!(kept, ServerError::FileTooLarge));
    }
}
