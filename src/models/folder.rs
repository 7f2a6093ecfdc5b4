//! Folders group file records by path. A folder's `path` is its parent's
//! path joined with its `name`; top-level folders have an empty
//! `parent_path`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    #[serde(rename = "folderId")]
    pub id: Uuid,
    pub name: String,
    /// Full path, e.g. `projects/2025`. Matches `FileRecord::folder_path`.
    pub path: String,
    pub parent_path: String,
    pub created_at: DateTime<Utc>,
}
