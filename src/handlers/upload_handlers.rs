//! HTTP handlers for the upload protocol: chunked init/chunk/finalize/cancel
//! and the single-shot multipart upload. Parsing happens here; all session
//! logic is delegated to `UploadService`.

use crate::{
    errors::AppError,
    models::upload::{
        CancelUploadResponse, ChunkMeta, ChunkUploadResponse, FinalizeUploadRequest,
        FinalizeUploadResponse, InitUploadRequest, InitUploadResponse, UploadFilesResponse,
    },
    services::upload_service::{IncomingFile, UploadService},
};
use axum::{
    Json,
    extract::{
        Path, State,
        multipart::{Multipart, MultipartError},
    },
};
use bytes::Bytes;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::bad_request(format!("multipart field `{}` is required", field)))
}

fn parse_field<T: FromStr>(value: Option<String>, field: &str) -> Result<T, AppError> {
    let raw = required(value, field)?;
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::bad_request(format!("multipart field `{}` is malformed", field)))
}

/// `POST /notes/uploads/init`
pub async fn init_upload(
    State(service): State<UploadService>,
    Json(req): Json<InitUploadRequest>,
) -> Result<Json<InitUploadResponse>, AppError> {
    Ok(Json(service.init(req).await?))
}

/// `POST /notes/uploads/chunk`: multipart with `chunk` bytes plus
/// `uploadId`, `chunkIndex`, `totalChunks`, `filename`, `folderPath`, `fileType`.
pub async fn upload_chunk(
    State(service): State<UploadService>,
    mut multipart: Multipart,
) -> Result<Json<ChunkUploadResponse>, AppError> {
    let mut chunk: Option<Bytes> = None;
    let mut upload_id = None;
    let mut chunk_index = None;
    let mut total_chunks = None;
    let mut filename = None;
    let mut folder_path = None;
    let mut file_type = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "chunk" => chunk = Some(field.bytes().await.map_err(multipart_error)?),
            "uploadId" => upload_id = Some(field.text().await.map_err(multipart_error)?),
            "chunkIndex" => chunk_index = Some(field.text().await.map_err(multipart_error)?),
            "totalChunks" => total_chunks = Some(field.text().await.map_err(multipart_error)?),
            "filename" => filename = Some(field.text().await.map_err(multipart_error)?),
            "folderPath" => folder_path = Some(field.text().await.map_err(multipart_error)?),
            "fileType" => file_type = Some(field.text().await.map_err(multipart_error)?),
            other => debug!("ignoring multipart field `{}`", other),
        }
    }

    let meta = ChunkMeta {
        upload_id: parse_field::<Uuid>(upload_id, "uploadId")?,
        chunk_index: parse_field(chunk_index, "chunkIndex")?,
        total_chunks: parse_field(total_chunks, "totalChunks")?,
        filename: filename.unwrap_or_default(),
        folder_path: folder_path.unwrap_or_default(),
        file_type: file_type.unwrap_or_default(),
    };
    let chunk = required(chunk, "chunk")?;

    Ok(Json(service.upload_chunk(&meta, chunk).await?))
}

/// `POST /notes/uploads/finalize`
pub async fn finalize_upload(
    State(service): State<UploadService>,
    Json(req): Json<FinalizeUploadRequest>,
) -> Result<Json<FinalizeUploadResponse>, AppError> {
    let file = service.finalize(&req).await?;
    Ok(Json(FinalizeUploadResponse { file }))
}

/// `POST /notes/uploads/{upload_id}/cancel`
pub async fn cancel_upload(
    State(service): State<UploadService>,
    Path(upload_id): Path<Uuid>,
) -> Result<Json<CancelUploadResponse>, AppError> {
    let state = service.cancel(upload_id).await?;
    Ok(Json(CancelUploadResponse {
        upload_id,
        state: state.to_string(),
    }))
}

/// `POST /notes/files/upload`: multipart with `folderPath` and one or more
/// `files` parts, each stored whole.
pub async fn upload_files(
    State(service): State<UploadService>,
    mut multipart: Multipart,
) -> Result<Json<UploadFilesResponse>, AppError> {
    let mut folder_path = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "folderPath" => folder_path = Some(field.text().await.map_err(multipart_error)?),
            "files" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::bad_request("file part is missing a filename"))?;
                let file_type = field.content_type().map(str::to_string).unwrap_or_default();
                let data = field.bytes().await.map_err(multipart_error)?;
                files.push(IncomingFile {
                    filename,
                    file_type,
                    data,
                });
            }
            other => debug!("ignoring multipart field `{}`", other),
        }
    }

    let folder_path = folder_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("Folder path is required"))?;
    let files = service.upload_files(&folder_path, files).await?;

    Ok(Json(UploadFilesResponse {
        message: "Files uploaded successfully".into(),
        files,
    }))
}
