use crate::services::{
    block_store::BlockStoreError, folder_service::FolderError, upload_service::UploadError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{} {}", self.status, self.message);
        }
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let status = match &err {
            UploadError::Validation(_) => StatusCode::BAD_REQUEST,
            UploadError::InvalidSession(_)
            | UploadError::FileNotFound(_)
            | UploadError::BlobNotFound(_) => StatusCode::NOT_FOUND,
            UploadError::Conflict { .. } => StatusCode::CONFLICT,
            UploadError::Allocation(_) | UploadError::ChunkRelay { .. } => StatusCode::BAD_GATEWAY,
            UploadError::Storage(BlockStoreError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
            UploadError::Finalize(_) | UploadError::Storage(_) | UploadError::Sqlx(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError::new(status, err.to_string())
    }
}

impl From<FolderError> for AppError {
    fn from(err: FolderError) -> Self {
        let status = match &err {
            FolderError::Validation(_) => StatusCode::BAD_REQUEST,
            FolderError::NotFound(_) => StatusCode::NOT_FOUND,
            FolderError::Exists(_) => StatusCode::CONFLICT,
            FolderError::Storage(_) | FolderError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload_session::SessionState;
    use uuid::Uuid;

    #[test]
    fn upload_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        let cases = [
            (UploadError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (UploadError::InvalidSession(id), StatusCode::NOT_FOUND),
            (
                UploadError::Conflict {
                    upload_id: id,
                    state: SessionState::Cancelled,
                },
                StatusCode::CONFLICT,
            ),
            (
                UploadError::Allocation(BlockStoreError::StagingNotFound(id)),
                StatusCode::BAD_GATEWAY,
            ),
            (
                UploadError::Finalize("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn folder_errors_map_to_statuses() {
        assert_eq!(
            AppError::from(FolderError::Exists("docs".into())).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(FolderError::NotFound(Uuid::nil())).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(FolderError::Validation("bad".into())).status,
            StatusCode::BAD_REQUEST
        );
    }
}
