//! Represents a chunked upload session and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of an upload attempt.
///
/// ```text
/// open ──finalize──▶ finalizing ──▶ committed
///   │                    │
///   │                    ├─(commit failed)──▶ open
///   │                    └─(record failed)──▶ failed
///   ├──cancel──▶ cancelled
///   └──sweep───▶ expired
/// ```
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionState {
    /// Accepting chunks.
    Open,
    /// Block list commit in progress.
    Finalizing,
    /// Blob committed and FileRecord written. Terminal.
    Committed,
    /// Aborted by the client. Terminal.
    Cancelled,
    /// Abandoned and swept. Terminal.
    Expired,
    /// Commit succeeded but the record could not be written; blob removed. Terminal.
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Finalizing => "finalizing",
            SessionState::Committed => "committed",
            SessionState::Cancelled => "cancelled",
            SessionState::Expired => "expired",
            SessionState::Failed => "failed",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Open, Finalizing)
                | (Open, Cancelled)
                | (Open, Expired)
                | (Finalizing, Open)
                | (Finalizing, Committed)
                | (Finalizing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Committed
                | SessionState::Cancelled
                | SessionState::Expired
                | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side view of one upload attempt.
///
/// The fields supplied at init are immutable for the session's lifetime;
/// only `state` and `updated_at` change. Chunk bytes are never held here:
/// they live in the block store's staging area.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadSession {
    pub upload_id: Uuid,
    pub filename: String,
    pub folder_path: String,
    pub file_type: String,
    pub declared_size: i64,
    /// Chunk size the server expects for this session.
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Expected byte length of chunk `index`, or `None` if out of range.
    pub fn expected_chunk_len(&self, index: i64) -> Option<i64> {
        if index < 0 || index >= self.total_chunks {
            return None;
        }
        if index == self.total_chunks - 1 {
            Some(self.declared_size - index * self.chunk_size)
        } else {
            Some(self.chunk_size)
        }
    }
}
