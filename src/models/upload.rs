//! JSON bodies exchanged between the uploader and the session handler.
//!
//! Field names are camelCase on the wire.

use crate::models::file_record::FileRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /notes/uploads/init` body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub filename: String,
    #[serde(default)]
    pub file_type: String,
    pub file_size: u64,
    pub folder_path: String,
}

/// `POST /notes/uploads/init` response. `chunk_size` is the split size the
/// client must use for this session.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: Uuid,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

/// Text fields sent alongside each chunk's bytes in the multipart body.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub upload_id: Uuid,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub filename: String,
    pub folder_path: String,
    pub file_type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub block_id: String,
}

/// `POST /notes/uploads/finalize` body. `block_ids[i]` is the block returned
/// for chunk index `i`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeUploadRequest {
    pub upload_id: Uuid,
    pub filename: String,
    pub folder_path: String,
    #[serde(default)]
    pub file_type: String,
    pub file_size: u64,
    pub block_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FinalizeUploadResponse {
    pub file: FileRecord,
}

/// Response for the single-shot multipart upload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadFilesResponse {
    pub message: String,
    pub files: Vec<FileRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FileListResponse {
    pub files: Vec<FileRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CancelUploadResponse {
    pub upload_id: Uuid,
    pub state: String,
}
