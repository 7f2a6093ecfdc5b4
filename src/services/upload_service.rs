//! src/services/upload_service.rs
//!
//! UploadService is the server half of the chunked upload protocol. Sessions and
//! file records live in SQLite; chunk bytes are relayed straight to the
//! block store's staging area and never buffered across requests.
//!
//! Per upload attempt: `init` opens a session, `upload_chunk` relays one
//! block at a time (any order, any concurrency), and `finalize` commits the
//! ordered block list and writes the `FileRecord`. Small files skip all of
//! this through `upload_files`.

use crate::{
    models::{
        file_record::FileRecord,
        upload::{ChunkMeta, ChunkUploadResponse, FinalizeUploadRequest, InitUploadRequest,
            InitUploadResponse},
        upload_session::{SessionState, UploadSession},
    },
    services::block_store::{BlobReader, BlockStore, BlockStoreError, CommittedBlob},
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";
pub const MAX_FILES_PER_REQUEST: usize = 10;
const BLOB_ROOT: &str = "notes";
const MAX_FOLDER_PATH_LEN: usize = 512;
const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not allocate upload session: {0}")]
    Allocation(#[source] BlockStoreError),
    #[error("failed to relay chunk {index}: {source}")]
    ChunkRelay {
        index: u64,
        #[source]
        source: BlockStoreError,
    },
    #[error("upload session `{0}` not found")]
    InvalidSession(Uuid),
    #[error("{0}")]
    Validation(String),
    #[error("finalize failed: {0}")]
    Finalize(String),
    #[error("upload session `{upload_id}` is {state}")]
    Conflict {
        upload_id: Uuid,
        state: SessionState,
    },
    #[error("file `{0}` not found")]
    FileNotFound(Uuid),
    #[error("blob `{0}` not found")]
    BlobNotFound(String),
    #[error(transparent)]
    Storage(BlockStoreError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Tunables for the session handler.
#[derive(Clone, Debug)]
pub struct UploadSettings {
    /// Chunk size announced to clients at init and enforced per chunk.
    pub chunk_size: u64,
    /// Prefix for the public URL recorded in each FileRecord.
    pub public_base_url: String,
    /// Open sessions older than this are expired by the sweep.
    pub session_ttl: Duration,
    /// Upper bound on files per single-shot multipart request.
    pub max_files_per_request: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            public_base_url: "http://localhost:3000/blobs".into(),
            session_ttl: Duration::hours(24),
            max_files_per_request: MAX_FILES_PER_REQUEST,
        }
    }
}

/// One file taken from a single-shot multipart request.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub file_type: String,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct UploadService {
    /// Shared SQLite connection pool used for sessions and file records.
    pub db: Arc<SqlitePool>,

    /// Durable block storage that chunks are relayed to.
    pub store: Arc<dyn BlockStore>,

    pub settings: UploadSettings,
}

impl UploadService {
    pub fn new(db: Arc<SqlitePool>, store: Arc<dyn BlockStore>, settings: UploadSettings) -> Self {
        Self {
            db,
            store,
            settings,
        }
    }

    /// Open a new upload session and its staging area.
    pub async fn init(&self, req: InitUploadRequest) -> UploadResult<InitUploadResponse> {
        validate_filename(&req.filename)?;
        validate_folder_path(&req.folder_path)?;
        if req.file_size == 0 {
            return Err(UploadError::Validation(
                "fileSize must be greater than zero".into(),
            ));
        }
        let declared_size = i64::try_from(req.file_size)
            .map_err(|_| UploadError::Validation("fileSize is too large".into()))?;

        let chunk_size = self.settings.chunk_size;
        let total_chunks = req.file_size.div_ceil(chunk_size);
        let upload_id = Uuid::new_v4();

        self.store
            .open_staging(upload_id)
            .await
            .map_err(UploadError::Allocation)?;

        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO upload_sessions (
                upload_id, filename, folder_path, file_type, declared_size,
                chunk_size, total_chunks, state, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(upload_id)
        .bind(&req.filename)
        .bind(&req.folder_path)
        .bind(normalize_file_type(&req.file_type))
        .bind(declared_size)
        .bind(chunk_size as i64)
        .bind(total_chunks as i64)
        .bind(SessionState::Open.as_str())
        .bind(now)
        .bind(now)
        .execute(&*self.db)
        .await;

        if let Err(err) = inserted {
            if let Err(cleanup) = self.store.abort_staging(upload_id).await {
                warn!("failed to discard staging for {}: {}", upload_id, cleanup);
            }
            return Err(UploadError::Sqlx(err));
        }

        info!(
            "opened upload {} for {}/{} ({} bytes, {} chunks)",
            upload_id, req.folder_path, req.filename, req.file_size, total_chunks
        );

        Ok(InitUploadResponse {
            upload_id,
            chunk_size,
            total_chunks,
        })
    }

    /// Relay one chunk to the block store.
    ///
    /// Chunk ordering and completeness are not tracked here; only the
    /// chunk's length is checked against the session's chunk size.
    pub async fn upload_chunk(
        &self,
        meta: &ChunkMeta,
        data: Bytes,
    ) -> UploadResult<ChunkUploadResponse> {
        let session = self.fetch_session(meta.upload_id).await?;
        if session.state != SessionState::Open {
            return Err(UploadError::Conflict {
                upload_id: session.upload_id,
                state: session.state,
            });
        }
        if i64::try_from(meta.total_chunks).ok() != Some(session.total_chunks) {
            return Err(UploadError::Validation(format!(
                "totalChunks {} does not match session ({})",
                meta.total_chunks, session.total_chunks
            )));
        }
        let expected = i64::try_from(meta.chunk_index)
            .ok()
            .and_then(|index| session.expected_chunk_len(index))
            .ok_or_else(|| {
                UploadError::Validation(format!(
                    "chunkIndex {} out of range 0..{}",
                    meta.chunk_index, session.total_chunks
                ))
            })?;
        if data.len() as i64 != expected {
            return Err(UploadError::Validation(format!(
                "chunk {} is {} bytes, expected {}",
                meta.chunk_index,
                data.len(),
                expected
            )));
        }

        let len = data.len();
        let block_id = self
            .store
            .stage_block(session.upload_id, meta.chunk_index, data)
            .await
            .map_err(|err| match err {
                BlockStoreError::StagingNotFound(id) => UploadError::InvalidSession(id),
                other => UploadError::ChunkRelay {
                    index: meta.chunk_index,
                    source: other,
                },
            })?;

        debug!(
            "relayed chunk {}/{} ({} bytes) for upload {}",
            meta.chunk_index + 1,
            meta.total_chunks,
            len,
            session.upload_id
        );

        Ok(ChunkUploadResponse { block_id })
    }

    /// Commit the ordered block list and record the finished file.
    ///
    /// Repeating finalize on a committed session returns the existing record.
    pub async fn finalize(&self, req: &FinalizeUploadRequest) -> UploadResult<FileRecord> {
        let session = self.fetch_session(req.upload_id).await?;
        match session.state {
            SessionState::Open => {}
            SessionState::Committed => {
                debug!("finalize replayed for committed upload {}", req.upload_id);
                return self.fetch_record_by_upload(req.upload_id).await;
            }
            state => {
                return Err(UploadError::Conflict {
                    upload_id: req.upload_id,
                    state,
                });
            }
        }

        if req.filename != session.filename || req.folder_path != session.folder_path {
            return Err(UploadError::Validation(
                "filename/folderPath do not match the upload session".into(),
            ));
        }
        if i64::try_from(req.file_size).ok() != Some(session.declared_size) {
            return Err(UploadError::Validation(format!(
                "fileSize {} does not match session ({})",
                req.file_size, session.declared_size
            )));
        }
        if req.block_ids.len() as i64 != session.total_chunks {
            return Err(UploadError::Validation(format!(
                "expected {} block ids, got {}",
                session.total_chunks,
                req.block_ids.len()
            )));
        }
        if let Some(gap) = req.block_ids.iter().position(|id| id.is_empty()) {
            return Err(UploadError::Validation(format!(
                "block id for chunk {} is missing",
                gap
            )));
        }

        if !self
            .transition(session.upload_id, SessionState::Open, SessionState::Finalizing)
            .await?
        {
            let current = self.fetch_session(session.upload_id).await?;
            return Err(UploadError::Conflict {
                upload_id: current.upload_id,
                state: current.state,
            });
        }

        let blob_path = blob_path_for(&session.folder_path, &session.filename);
        let blob = match self
            .store
            .commit_block_list(
                session.upload_id,
                &blob_path,
                &req.block_ids,
                session.declared_size as u64,
            )
            .await
        {
            Ok(blob) => blob,
            Err(err) => {
                warn!("commit failed for upload {}: {}", session.upload_id, err);
                self.transition_best_effort(
                    session.upload_id,
                    SessionState::Finalizing,
                    SessionState::Open,
                )
                .await;
                return Err(UploadError::Finalize(err.to_string()));
            }
        };

        match self.record_commit(&session, &blob).await {
            Ok(record) => {
                info!(
                    "committed upload {} as {} ({} bytes)",
                    session.upload_id, record.blob_path, record.size_bytes
                );
                Ok(record)
            }
            Err(err) => {
                warn!(
                    "record write failed for upload {}, discarding assembled blob: {}",
                    session.upload_id, err
                );
                if let Err(cleanup) = self.store.abort_staging(session.upload_id).await {
                    warn!(
                        "failed to discard staging for {}: {}",
                        session.upload_id, cleanup
                    );
                }
                self.transition_best_effort(
                    session.upload_id,
                    SessionState::Finalizing,
                    SessionState::Failed,
                )
                .await;
                Err(UploadError::Finalize(format!("metadata write failed: {}", err)))
            }
        }
    }

    /// Abort an open session and discard its staged blocks.
    pub async fn cancel(&self, upload_id: Uuid) -> UploadResult<SessionState> {
        let session = self.fetch_session(upload_id).await?;
        match session.state {
            SessionState::Cancelled => return Ok(SessionState::Cancelled),
            SessionState::Open => {}
            state => return Err(UploadError::Conflict { upload_id, state }),
        }
        if !self
            .transition(upload_id, SessionState::Open, SessionState::Cancelled)
            .await?
        {
            let current = self.fetch_session(upload_id).await?;
            return Err(UploadError::Conflict {
                upload_id,
                state: current.state,
            });
        }
        if let Err(err) = self.store.abort_staging(upload_id).await {
            warn!("failed to discard staging for {}: {}", upload_id, err);
        }
        info!("cancelled upload {}", upload_id);
        Ok(SessionState::Cancelled)
    }

    /// Expire open sessions created before `now - session_ttl` and discard
    /// their staged blocks. Returns the number of sessions expired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> UploadResult<usize> {
        let cutoff = now - self.settings.session_ttl;
        let stale = sqlx::query_as::<_, UploadSession>(
            "SELECT upload_id, filename, folder_path, file_type, declared_size,
                    chunk_size, total_chunks, state, created_at, updated_at
             FROM upload_sessions
             WHERE state = ? AND julianday(created_at) < julianday(?)",
        )
        .bind(SessionState::Open.as_str())
        .bind(cutoff)
        .fetch_all(&*self.db)
        .await?;

        let mut expired = 0;
        for session in stale {
            if !self
                .transition(session.upload_id, SessionState::Open, SessionState::Expired)
                .await?
            {
                continue;
            }
            if let Err(err) = self.store.abort_staging(session.upload_id).await {
                warn!(
                    "failed to discard staging for {}: {}",
                    session.upload_id, err
                );
            }
            expired += 1;
        }
        if expired > 0 {
            info!("expired {} abandoned upload session(s)", expired);
        }
        Ok(expired)
    }

    /// Store whole files in one request each (the small-file path).
    pub async fn upload_files(
        &self,
        folder_path: &str,
        files: Vec<IncomingFile>,
    ) -> UploadResult<Vec<FileRecord>> {
        validate_folder_path(folder_path)?;
        if files.is_empty() {
            return Err(UploadError::Validation("No files uploaded".into()));
        }
        if files.len() > self.settings.max_files_per_request {
            return Err(UploadError::Validation(format!(
                "at most {} files per request",
                self.settings.max_files_per_request
            )));
        }
        for file in &files {
            validate_filename(&file.filename)?;
        }

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let blob_path = blob_path_for(folder_path, &file.filename);
            let blob = self
                .store
                .put_blob(&blob_path, file.data)
                .await
                .map_err(UploadError::Storage)?;
            let record = self
                .insert_record(
                    None,
                    &file.filename,
                    folder_path,
                    &normalize_file_type(&file.file_type),
                    &blob,
                )
                .await?;
            info!("stored {} ({} bytes)", record.blob_path, record.size_bytes);
            records.push(record);
        }
        Ok(records)
    }

    pub async fn list_files(&self, folder_path: &str) -> UploadResult<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(
            "SELECT id, upload_id, filename, folder_path, blob_path, url, file_type,
                    size_bytes, etag, uploaded_at
             FROM file_records WHERE folder_path = ?
             ORDER BY uploaded_at DESC",
        )
        .bind(folder_path)
        .fetch_all(&*self.db)
        .await?;
        Ok(files)
    }

    pub async fn list_all_files(&self) -> UploadResult<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(
            "SELECT id, upload_id, filename, folder_path, blob_path, url, file_type,
                    size_bytes, etag, uploaded_at
             FROM file_records ORDER BY uploaded_at DESC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(files)
    }

    pub async fn get_file(&self, file_id: Uuid) -> UploadResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT id, upload_id, filename, folder_path, blob_path, url, file_type,
                    size_bytes, etag, uploaded_at
             FROM file_records WHERE id = ?",
        )
        .bind(file_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => UploadError::FileNotFound(file_id),
            other => UploadError::Sqlx(other),
        })
    }

    /// Delete a file's blob, then its record.
    pub async fn delete_file(&self, file_id: Uuid) -> UploadResult<FileRecord> {
        let record = self.get_file(file_id).await?;
        self.store
            .delete_blob(&record.blob_path)
            .await
            .map_err(UploadError::Storage)?;
        sqlx::query("DELETE FROM file_records WHERE id = ?")
            .bind(file_id)
            .execute(&*self.db)
            .await?;
        info!("deleted file {} ({})", file_id, record.blob_path);
        Ok(record)
    }

    /// Most recent record pointing at `blob_path`, if any.
    pub async fn find_record_by_blob_path(
        &self,
        blob_path: &str,
    ) -> UploadResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT id, upload_id, filename, folder_path, blob_path, url, file_type,
                    size_bytes, etag, uploaded_at
             FROM file_records WHERE blob_path = ?
             ORDER BY uploaded_at DESC LIMIT 1",
        )
        .bind(blob_path)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    pub async fn open_blob(&self, blob_path: &str) -> UploadResult<BlobReader> {
        self.store.open_blob(blob_path).await.map_err(|err| match err {
            BlockStoreError::BlobNotFound(path) | BlockStoreError::InvalidPath(path) => {
                UploadError::BlobNotFound(path)
            }
            other => UploadError::Storage(other),
        })
    }

    pub async fn fetch_session(&self, upload_id: Uuid) -> UploadResult<UploadSession> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT upload_id, filename, folder_path, file_type, declared_size,
                    chunk_size, total_chunks, state, created_at, updated_at
             FROM upload_sessions WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => UploadError::InvalidSession(upload_id),
            other => UploadError::Sqlx(other),
        })
    }

    async fn fetch_record_by_upload(&self, upload_id: Uuid) -> UploadResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT id, upload_id, filename, folder_path, blob_path, url, file_type,
                    size_bytes, etag, uploaded_at
             FROM file_records WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => {
                UploadError::Finalize(format!("upload {} has no file record", upload_id))
            }
            other => UploadError::Sqlx(other),
        })
    }

    /// Compare-and-set on the session state. Returns false if the session
    /// was not in `from`.
    async fn transition(
        &self,
        upload_id: Uuid,
        from: SessionState,
        to: SessionState,
    ) -> UploadResult<bool> {
        debug_assert!(from.can_transition_to(to));
        let result = sqlx::query(
            "UPDATE upload_sessions SET state = ?, updated_at = ?
             WHERE upload_id = ? AND state = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(upload_id)
        .bind(from.as_str())
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn transition_best_effort(&self, upload_id: Uuid, from: SessionState, to: SessionState) {
        match self.transition(upload_id, from, to).await {
            Ok(true) => {}
            Ok(false) => warn!("upload {} was no longer {}", upload_id, from),
            Err(err) => warn!("failed to move upload {} to {}: {}", upload_id, to, err),
        }
    }

    /// Write the FileRecord, mark the session committed and publish the
    /// assembled blob. The blob is moved into place only after every
    /// statement succeeded and before the transaction commits, so a failed
    /// write leaves the previous blob and its record as they were.
    async fn record_commit(
        &self,
        session: &UploadSession,
        blob: &CommittedBlob,
    ) -> UploadResult<FileRecord> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "DELETE FROM file_records
             WHERE blob_path = ? AND (upload_id IS NULL OR upload_id != ?)",
        )
        .bind(&blob.blob_path)
        .bind(session.upload_id)
        .execute(&mut *tx)
        .await?;

        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO file_records (
                id, upload_id, filename, folder_path, blob_path, url,
                file_type, size_bytes, etag, uploaded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(upload_id) DO UPDATE SET
                blob_path = excluded.blob_path,
                url = excluded.url,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at
            RETURNING id, upload_id, filename, folder_path, blob_path, url,
                      file_type, size_bytes, etag, uploaded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session.upload_id)
        .bind(&session.filename)
        .bind(&session.folder_path)
        .bind(&blob.blob_path)
        .bind(self.public_url(&blob.blob_path))
        .bind(&session.file_type)
        .bind(blob.size as i64)
        .bind(&blob.etag)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query(
            "UPDATE upload_sessions SET state = ?, updated_at = ?
             WHERE upload_id = ? AND state = ?",
        )
        .bind(SessionState::Committed.as_str())
        .bind(Utc::now())
        .bind(session.upload_id)
        .bind(SessionState::Finalizing.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(UploadError::Finalize(format!(
                "upload {} left the finalizing state",
                session.upload_id
            )));
        }

        self.store
            .publish_blob(session.upload_id, &blob.blob_path)
            .await
            .map_err(UploadError::Storage)?;

        if let Err(err) = tx.commit().await {
            // The live blob already holds the new bytes; no record may
            // describe older content at that path.
            self.discard_blob_and_records(&blob.blob_path).await;
            return Err(err.into());
        }
        Ok(record)
    }

    async fn discard_blob_and_records(&self, blob_path: &str) {
        if let Err(err) = sqlx::query("DELETE FROM file_records WHERE blob_path = ?")
            .bind(blob_path)
            .execute(&*self.db)
            .await
        {
            warn!("failed to drop records for {}: {}", blob_path, err);
        }
        if let Err(err) = self.store.delete_blob(blob_path).await {
            warn!("failed to remove blob {}: {}", blob_path, err);
        }
    }

    /// Insert a record for a single-shot upload, replacing any record that
    /// pointed at the same blob.
    async fn insert_record(
        &self,
        upload_id: Option<Uuid>,
        filename: &str,
        folder_path: &str,
        file_type: &str,
        blob: &CommittedBlob,
    ) -> UploadResult<FileRecord> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM file_records WHERE blob_path = ?")
            .bind(&blob.blob_path)
            .execute(&mut *tx)
            .await?;
        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO file_records (
                id, upload_id, filename, folder_path, blob_path, url,
                file_type, size_bytes, etag, uploaded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, upload_id, filename, folder_path, blob_path, url,
                      file_type, size_bytes, etag, uploaded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(upload_id)
        .bind(filename)
        .bind(folder_path)
        .bind(&blob.blob_path)
        .bind(self.public_url(&blob.blob_path))
        .bind(file_type)
        .bind(blob.size as i64)
        .bind(&blob.etag)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    fn public_url(&self, blob_path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.public_base_url.trim_end_matches('/'),
            blob_path
        )
    }
}

/// Blob location for a file: `notes/{folderPath}/{filename}`.
pub fn blob_path_for(folder_path: &str, filename: &str) -> String {
    format!("{}/{}/{}", BLOB_ROOT, folder_path, filename)
}

fn normalize_file_type(file_type: &str) -> String {
    let trimmed = file_type.trim();
    if trimmed.is_empty() {
        DEFAULT_FILE_TYPE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Folder paths are `/`-separated relative paths without traversal.
pub(crate) fn validate_folder_path(folder_path: &str) -> UploadResult<()> {
    let invalid = |reason: &str| {
        Err(UploadError::Validation(format!(
            "invalid folderPath `{}`: {}",
            folder_path, reason
        )))
    };
    if folder_path.is_empty() {
        return invalid("folder path is required");
    }
    if folder_path.len() > MAX_FOLDER_PATH_LEN {
        return invalid("too long");
    }
    if folder_path
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\')
    {
        return invalid("contains control characters or backslashes");
    }
    if folder_path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return invalid("segments must be non-empty and must not be `.` or `..`");
    }
    Ok(())
}

fn validate_filename(filename: &str) -> UploadResult<()> {
    let invalid = |reason: &str| {
        Err(UploadError::Validation(format!(
            "invalid filename `{}`: {}",
            filename, reason
        )))
    };
    if filename.is_empty() {
        return invalid("filename is required");
    }
    if filename.len() > MAX_FILENAME_LEN {
        return invalid("too long");
    }
    if filename == "." || filename == ".." {
        return invalid("reserved name");
    }
    if filename
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
    {
        return invalid("contains path separators or control characters");
    }
    Ok(())
}
