//! FolderService: folder rows and recursive folder deletion.
//!
//! Folders are bookkeeping only. Files are addressed by `folder_path` and can
//! be uploaded into a path that has no folder row; deleting a folder removes
//! every file at or below its path regardless.

use crate::{
    models::{file_record::FileRecord, folder::Folder},
    services::{
        block_store::{BlockStore, BlockStoreError},
        upload_service::validate_folder_path,
    },
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_FOLDER_NAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("{0}")]
    Validation(String),
    #[error("folder `{0}` not found")]
    NotFound(Uuid),
    #[error("folder `{0}` already exists")]
    Exists(String),
    #[error(transparent)]
    Storage(BlockStoreError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type FolderResult<T> = Result<T, FolderError>;

/// What a recursive delete removed.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderDeletion {
    pub folder: Folder,
    pub deleted_folders: u64,
    pub deleted_files: usize,
}

#[derive(Clone)]
pub struct FolderService {
    pub db: Arc<SqlitePool>,
    pub store: Arc<dyn BlockStore>,
}

impl FolderService {
    pub fn new(db: Arc<SqlitePool>, store: Arc<dyn BlockStore>) -> Self {
        Self { db, store }
    }

    /// Create `name` under `parent_path` (empty for top level).
    pub async fn create_folder(&self, name: &str, parent_path: &str) -> FolderResult<Folder> {
        validate_folder_name(name)?;
        let parent_path = parent_path.trim_matches('/');
        let path = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent_path, name)
        };
        validate_folder_path(&path).map_err(|err| FolderError::Validation(err.to_string()))?;

        let folder = sqlx::query_as::<_, Folder>(
            "INSERT INTO folders (id, name, path, parent_path, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, name, path, parent_path, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&path)
        .bind(parent_path)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                FolderError::Exists(path.clone())
            }
            other => FolderError::Sqlx(other),
        })?;

        info!("created folder {}", folder.path);
        Ok(folder)
    }

    /// Direct children of `parent_path`, newest first.
    pub async fn list_folders(&self, parent_path: &str) -> FolderResult<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(
            "SELECT id, name, path, parent_path, created_at
             FROM folders WHERE parent_path = ?
             ORDER BY created_at DESC",
        )
        .bind(parent_path.trim_matches('/'))
        .fetch_all(&*self.db)
        .await?;
        Ok(folders)
    }

    /// Every folder, ordered by path so parents precede their children.
    pub async fn folder_tree(&self) -> FolderResult<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(
            "SELECT id, name, path, parent_path, created_at
             FROM folders ORDER BY path ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(folders)
    }

    pub async fn get_folder(&self, folder_id: Uuid) -> FolderResult<Folder> {
        sqlx::query_as::<_, Folder>(
            "SELECT id, name, path, parent_path, created_at
             FROM folders WHERE id = ?",
        )
        .bind(folder_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => FolderError::NotFound(folder_id),
            other => FolderError::Sqlx(other),
        })
    }

    /// Delete a folder, its subfolders, and every file stored at or below
    /// its path.
    ///
    /// Each file's blob is removed before its record. If a blob cannot be
    /// removed the delete stops there, leaving that file and the folder rows
    /// in place.
    pub async fn delete_folder(&self, folder_id: Uuid) -> FolderResult<FolderDeletion> {
        let folder = self.get_folder(folder_id).await?;

        let files = sqlx::query_as::<_, FileRecord>(
            "SELECT id, upload_id, filename, folder_path, blob_path, url, file_type,
                    size_bytes, etag, uploaded_at
             FROM file_records
             WHERE folder_path = ? OR substr(folder_path, 1, length(?) + 1) = ? || '/'",
        )
        .bind(&folder.path)
        .bind(&folder.path)
        .bind(&folder.path)
        .fetch_all(&*self.db)
        .await?;

        for file in &files {
            self.store
                .delete_blob(&file.blob_path)
                .await
                .map_err(FolderError::Storage)?;
            sqlx::query("DELETE FROM file_records WHERE id = ?")
                .bind(file.id)
                .execute(&*self.db)
                .await?;
            debug!("removed {} with folder {}", file.blob_path, folder.path);
        }

        let deleted_folders = sqlx::query(
            "DELETE FROM folders
             WHERE path = ? OR substr(path, 1, length(?) + 1) = ? || '/'",
        )
        .bind(&folder.path)
        .bind(&folder.path)
        .bind(&folder.path)
        .execute(&*self.db)
        .await?
        .rows_affected();

        info!(
            "deleted folder {} ({} folders, {} files)",
            folder.path,
            deleted_folders,
            files.len()
        );
        Ok(FolderDeletion {
            folder,
            deleted_folders,
            deleted_files: files.len(),
        })
    }
}

fn validate_folder_name(name: &str) -> FolderResult<()> {
    let invalid = |reason: &str| {
        Err(FolderError::Validation(format!(
            "invalid folder name `{}`: {}",
            name, reason
        )))
    };
    if name.trim().is_empty() {
        return Err(FolderError::Validation("Folder name is required".into()));
    }
    if name.len() > MAX_FOLDER_NAME_LEN {
        return invalid("too long");
    }
    if name == "." || name == ".." {
        return invalid("reserved name");
    }
    if name
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
    {
        return invalid("contains path separators or control characters");
    }
    Ok(())
}
