//! HTTP handlers for committed files: record listing/deletion and blob
//! downloads.

use crate::{
    errors::AppError,
    models::{file_record::FileRecord, upload::FileListResponse},
    services::upload_service::UploadService,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderQuery {
    pub folder_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFileResponse {
    pub message: String,
    pub file: FileRecord,
}

/// `GET /notes/files?folderPath=`: files in one folder, newest first.
pub async fn list_files(
    State(service): State<UploadService>,
    Query(q): Query<FolderQuery>,
) -> Result<Json<FileListResponse>, AppError> {
    let folder_path = q
        .folder_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("Folder path is required"))?;
    let files = service.list_files(&folder_path).await?;
    Ok(Json(FileListResponse { files }))
}

/// `GET /notes/files/all`
pub async fn list_all_files(
    State(service): State<UploadService>,
) -> Result<Json<FileListResponse>, AppError> {
    let files = service.list_all_files().await?;
    Ok(Json(FileListResponse { files }))
}

/// `GET /notes/files/{file_id}`
pub async fn get_file(
    State(service): State<UploadService>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(service.get_file(file_id).await?))
}

/// `DELETE /notes/files/{file_id}`: removes the blob, then the record.
pub async fn delete_file(
    State(service): State<UploadService>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<DeleteFileResponse>, AppError> {
    let file = service.delete_file(file_id).await?;
    Ok(Json(DeleteFileResponse {
        message: "File deleted successfully".into(),
        file,
    }))
}

/// `GET /blobs/{*path}`: stream a committed blob.
pub async fn get_blob(
    State(service): State<UploadService>,
    Path(blob_path): Path<String>,
) -> Result<Response, AppError> {
    let blob = service.open_blob(&blob_path).await?;
    let record = service.find_record_by_blob_path(&blob_path).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(blob.reader)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();

    let content_type = record
        .as_ref()
        .map(|r| r.file_type.as_str())
        .unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(blob.size));
    if let Some(etag) = record.as_ref().and_then(|r| r.etag.as_ref()) {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    Ok(response)
}
