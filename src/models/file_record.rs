//! Represents a file whose bytes are durably committed to block storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A finished upload, recorded in the metadata database.
///
/// Rows are only written after the blob has been committed, so the existence
/// of a `FileRecord` implies the blob at `blob_path` is complete.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Internal UUID for DB indexing, exposed to clients as `fileId`.
    #[serde(rename = "fileId")]
    pub id: Uuid,

    /// Session that produced this file. `None` for single-shot uploads.
    pub upload_id: Option<Uuid>,

    /// Original filename as supplied by the client.
    pub filename: String,

    /// Logical folder the file belongs to (e.g. `projects/2025`).
    pub folder_path: String,

    /// Location of the committed blob inside the block store.
    pub blob_path: String,

    /// Public URL that resolves to the blob.
    pub url: String,

    /// Declared MIME type.
    pub file_type: String,

    /// Size of the committed blob in bytes.
    #[serde(rename = "size")]
    pub size_bytes: i64,

    /// MD5 of the committed bytes.
    pub etag: Option<String>,

    pub uploaded_at: DateTime<Utc>,
}
