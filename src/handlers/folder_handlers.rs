//! HTTP handlers for folder management.

use crate::{
    errors::AppError,
    models::folder::Folder,
    services::folder_service::FolderService,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub parent_path: String,
}

#[derive(Debug, Serialize)]
pub struct CreateFolderResponse {
    pub message: String,
    pub folder: Folder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentQuery {
    #[serde(default)]
    pub parent_path: String,
}

#[derive(Debug, Serialize)]
pub struct FolderListResponse {
    pub folders: Vec<Folder>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFolderResponse {
    pub message: String,
    pub folder: Folder,
    pub deleted_folders: u64,
    pub deleted_files: usize,
}

/// `POST /notes/folder/create` with `{name, parentPath}`.
pub async fn create_folder(
    State(folders): State<FolderService>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<CreateFolderResponse>), AppError> {
    let name = req
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Folder name is required"))?;
    let folder = folders.create_folder(&name, &req.parent_path).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateFolderResponse {
            message: "Folder created successfully".into(),
            folder,
        }),
    ))
}

/// `GET /notes/folders?parentPath=`: direct children; top level when omitted.
pub async fn list_folders(
    State(folders): State<FolderService>,
    Query(q): Query<ParentQuery>,
) -> Result<Json<FolderListResponse>, AppError> {
    let folders = folders.list_folders(&q.parent_path).await?;
    Ok(Json(FolderListResponse { folders }))
}

/// `GET /notes/folders/tree`
pub async fn folder_tree(
    State(folders): State<FolderService>,
) -> Result<Json<FolderListResponse>, AppError> {
    let folders = folders.folder_tree().await?;
    Ok(Json(FolderListResponse { folders }))
}

/// `DELETE /notes/folders/{folder_id}`: the folder, its subfolders and
/// every file beneath them.
pub async fn delete_folder(
    State(folders): State<FolderService>,
    Path(folder_id): Path<Uuid>,
) -> Result<Json<DeleteFolderResponse>, AppError> {
    let deletion = folders.delete_folder(folder_id).await?;
    Ok(Json(DeleteFolderResponse {
        message: "Folder deleted successfully".into(),
        folder: deletion.folder,
        deleted_folders: deletion.deleted_folders,
        deleted_files: deletion.deleted_files,
    }))
}
