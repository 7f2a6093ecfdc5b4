//! Defines routes for the upload protocol, file records, folders and blob
//! downloads.
//!
//! ## Structure
//! - **Chunked upload**
//!   - `POST   /notes/uploads/init`: open a session, returns `{uploadId, chunkSize}`
//!   - `POST   /notes/uploads/chunk`: relay one chunk (multipart), returns `{blockId}`
//!   - `POST   /notes/uploads/finalize`: commit the ordered block list
//!   - `POST   /notes/uploads/{upload_id}/cancel`: abort an open session
//!
//! - **Files**
//!   - `POST   /notes/files/upload`: single-shot multipart upload
//!   - `GET    /notes/files?folderPath=`: list one folder
//!   - `GET    /notes/files/all`: list everything
//!   - `GET    /notes/files/{file_id}`: one record
//!   - `DELETE /notes/files/{file_id}`: delete blob and record
//!   - `GET    /blobs/{*path}`: download a committed blob
//!
//! - **Folders**
//!   - `POST   /notes/folder/create`: create `{name, parentPath}`
//!   - `GET    /notes/folders?parentPath=`: direct children
//!   - `GET    /notes/folders/tree`: every folder, by path
//!   - `DELETE /notes/folders/{folder_id}`: folder, subfolders and their files

use crate::{
    handlers::{
        file_handlers::{delete_file, get_blob, get_file, list_all_files, list_files},
        folder_handlers::{create_folder, delete_folder, folder_tree, list_folders},
        health_handlers::{healthz, readyz},
        upload_handlers::{cancel_upload, finalize_upload, init_upload, upload_chunk, upload_files},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

pub const INIT_PATH: &str = "/notes/uploads/init";
pub const CHUNK_PATH: &str = "/notes/uploads/chunk";
pub const FINALIZE_PATH: &str = "/notes/uploads/finalize";
pub const CANCEL_PATH_PREFIX: &str = "/notes/uploads";
pub const FILES_UPLOAD_PATH: &str = "/notes/files/upload";

/// Request body caps, in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyLimits {
    /// Every route except the multi-file upload. Must fit one chunk plus its
    /// multipart envelope.
    pub default: usize,
    /// `POST /notes/files/upload`, which carries several whole files.
    pub files_upload: usize,
}

pub fn routes(limits: BodyLimits) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // chunked upload protocol
        .route(INIT_PATH, post(init_upload))
        .route(CHUNK_PATH, post(upload_chunk))
        .route(FINALIZE_PATH, post(finalize_upload))
        .route("/notes/uploads/{upload_id}/cancel", post(cancel_upload))
        // file records
        .route(
            FILES_UPLOAD_PATH,
            post(upload_files).layer(DefaultBodyLimit::max(limits.files_upload)),
        )
        .route("/notes/files", get(list_files))
        .route("/notes/files/all", get(list_all_files))
        .route("/notes/files/{file_id}", get(get_file).delete(delete_file))
        .route("/blobs/{*path}", get(get_blob))
        // folders
        .route("/notes/folder/create", post(create_folder))
        .route("/notes/folders", get(list_folders))
        .route("/notes/folders/tree", get(folder_tree))
        .route("/notes/folders/{folder_id}", delete(delete_folder))
        .layer(DefaultBodyLimit::max(limits.default))
}
