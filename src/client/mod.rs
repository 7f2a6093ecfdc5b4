//! Client half of the chunked upload protocol.
//!
//! `ChunkedUploader` turns one file into network calls: a single multipart
//! request when the file is smaller than one chunk, otherwise
//! init → batches of parallel chunk uploads → finalize.

pub mod plan;
pub mod source;
pub mod transport;

use crate::{
    models::{
        file_record::FileRecord,
        upload::{ChunkMeta, FinalizeUploadRequest, InitUploadRequest},
    },
    services::upload_service::DEFAULT_FILE_TYPE,
};
use futures::future::join_all;
use std::{
    io,
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use plan::{CHUNK_SIZE, ChunkPlan};
pub use source::{ChunkSource, FileSource};
pub use transport::{Endpoints, HttpTransport, TransportError, UploadTransport};

/// Chunk requests in flight at once.
pub const MAX_PARALLEL_UPLOADS: usize = 3;

/// Called with `(bytes_uploaded, bytes_total)` each time a chunk completes.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

#[derive(Debug, Error)]
pub enum UploadClientError {
    #[error("failed to initialize upload: {0}")]
    Init(#[source] TransportError),
    #[error("failed to upload chunk {index} of {total}: {source}")]
    ChunkUpload {
        index: u64,
        total: u64,
        #[source]
        source: TransportError,
    },
    #[error("failed to finalize upload: {0}")]
    Finalize(#[source] TransportError),
    #[error("failed to upload file: {0}")]
    Direct(#[source] TransportError),
    #[error("upload cancelled")]
    Cancelled,
    #[error("block list incomplete: chunk {0} has no block id")]
    IncompleteBlockList(usize),
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(u64),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct UploaderOptions {
    /// Threshold for the single-shot path. The chunked path splits with the
    /// size the server returns from init.
    pub chunk_size: u64,
    pub max_parallel: usize,
}

impl Default for UploaderOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_parallel: MAX_PARALLEL_UPLOADS,
        }
    }
}

/// A file to upload and where it goes.
pub struct FileUpload<S> {
    pub source: S,
    pub filename: String,
    pub file_type: String,
    pub folder_path: String,
}

pub struct ChunkedUploader<T> {
    transport: T,
    options: UploaderOptions,
}

impl<T: UploadTransport> ChunkedUploader<T> {
    pub fn new(transport: T, options: UploaderOptions) -> Self {
        Self { transport, options }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upload `file`, reporting progress and honouring `cancel`.
    ///
    /// On any error no FileRecord exists for this attempt; staged blocks may
    /// remain on the server until the session is cancelled or swept.
    pub async fn upload<S: ChunkSource>(
        &self,
        file: &FileUpload<S>,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<FileRecord, UploadClientError> {
        let plan = ChunkPlan::new(file.source.len(), self.options.chunk_size)
            .ok_or(UploadClientError::InvalidChunkSize(self.options.chunk_size))?;
        if cancel.is_cancelled() {
            return Err(UploadClientError::Cancelled);
        }
        if plan.is_single_shot() {
            self.upload_single(file, progress).await
        } else {
            self.upload_chunked(file, progress, cancel).await
        }
    }

    async fn upload_single<S: ChunkSource>(
        &self,
        file: &FileUpload<S>,
        progress: Option<&ProgressFn>,
    ) -> Result<FileRecord, UploadClientError> {
        let size = file.source.len();
        let data = file.source.read_range(0..size).await?;
        let record = self
            .transport
            .upload_direct(
                &file.folder_path,
                &file.filename,
                file_type_or_default(&file.file_type),
                data,
            )
            .await
            .map_err(UploadClientError::Direct)?;
        if let Some(report) = progress {
            report(size, size);
        }
        info!("uploaded {} in one request ({} bytes)", file.filename, size);
        Ok(record)
    }

    async fn upload_chunked<S: ChunkSource>(
        &self,
        file: &FileUpload<S>,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<FileRecord, UploadClientError> {
        let size = file.source.len();
        let file_type = file_type_or_default(&file.file_type);
        let init = self
            .transport
            .init(&InitUploadRequest {
                filename: file.filename.clone(),
                file_type: file_type.to_string(),
                file_size: size,
                folder_path: file.folder_path.clone(),
            })
            .await
            .map_err(UploadClientError::Init)?;

        let plan = ChunkPlan::new(size, init.chunk_size)
            .ok_or(UploadClientError::InvalidChunkSize(init.chunk_size))?;
        let total = plan.total_chunks();
        info!(
            "upload {} opened for {} ({} bytes, {} chunks of {})",
            init.upload_id,
            file.filename,
            size,
            total,
            plan.chunk_size()
        );

        let mut block_ids: Vec<Option<String>> = vec![None; total as usize];
        let uploaded = AtomicU64::new(0);

        for batch in plan.batches(self.options.max_parallel) {
            if cancel.is_cancelled() {
                self.abort(init.upload_id).await;
                return Err(UploadClientError::Cancelled);
            }

            let uploads = batch.map(|index| {
                self.upload_one(file, &plan, init.upload_id, index, &uploaded, progress)
            });
            // Every chunk in the batch settles before the next batch starts.
            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.abort(init.upload_id).await;
                    return Err(UploadClientError::Cancelled);
                }
                results = join_all(uploads) => results,
            };

            let mut first_error = None;
            for result in results {
                match result {
                    Ok((index, block_id)) => block_ids[index] = Some(block_id),
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }
            if let Some(err) = first_error {
                warn!("upload {} failed: {}", init.upload_id, err);
                return Err(err);
            }
        }

        let block_ids = block_ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| id.ok_or(UploadClientError::IncompleteBlockList(index)))
            .collect::<Result<Vec<_>, _>>()?;

        if cancel.is_cancelled() {
            self.abort(init.upload_id).await;
            return Err(UploadClientError::Cancelled);
        }

        let record = self
            .transport
            .finalize(&FinalizeUploadRequest {
                upload_id: init.upload_id,
                filename: file.filename.clone(),
                folder_path: file.folder_path.clone(),
                file_type: file_type.to_string(),
                file_size: size,
                block_ids,
            })
            .await
            .map_err(UploadClientError::Finalize)?;

        info!("upload {} committed as {}", init.upload_id, record.url);
        Ok(record)
    }

    async fn upload_one<S: ChunkSource>(
        &self,
        file: &FileUpload<S>,
        plan: &ChunkPlan,
        upload_id: Uuid,
        index: u64,
        uploaded: &AtomicU64,
        progress: Option<&ProgressFn>,
    ) -> Result<(usize, String), UploadClientError> {
        let total = plan.total_chunks();
        let range = plan.range(index);
        let len = range.end - range.start;
        let chunk = file.source.read_range(range).await?;

        let meta = ChunkMeta {
            upload_id,
            chunk_index: index,
            total_chunks: total,
            filename: file.filename.clone(),
            folder_path: file.folder_path.clone(),
            file_type: file_type_or_default(&file.file_type).to_string(),
        };
        let response = self
            .transport
            .upload_chunk(&meta, chunk)
            .await
            .map_err(|source| UploadClientError::ChunkUpload {
                index,
                total,
                source,
            })?;

        // Counted only once the request has resolved.
        let done = uploaded.fetch_add(len, Ordering::SeqCst) + len;
        if let Some(report) = progress {
            report(done, plan.size());
        }
        debug!("chunk {}/{} of upload {} acknowledged", index + 1, total, upload_id);

        Ok((index as usize, response.block_id))
    }

    async fn abort(&self, upload_id: Uuid) {
        info!("cancelling upload {}", upload_id);
        if let Err(err) = self.transport.cancel(upload_id).await {
            warn!("failed to cancel upload {}: {}", upload_id, err);
        }
    }
}

fn file_type_or_default(file_type: &str) -> &str {
    if file_type.trim().is_empty() {
        DEFAULT_FILE_TYPE
    } else {
        file_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload::{ChunkUploadResponse, InitUploadResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    const MIB: u64 = 1024 * 1024;

    struct MockTransport {
        upload_id: Uuid,
        server_chunk_size: u64,
        fail_index: Option<u64>,
        cancel_on_index: Option<(u64, CancellationToken)>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        inits: Mutex<Vec<InitUploadRequest>>,
        chunks: Mutex<Vec<(u64, usize)>>,
        finalized: Mutex<Vec<FinalizeUploadRequest>>,
        cancelled: Mutex<Vec<Uuid>>,
        direct: Mutex<Vec<(String, usize)>>,
    }

    impl MockTransport {
        fn new(server_chunk_size: u64) -> Self {
            Self {
                upload_id: Uuid::new_v4(),
                server_chunk_size,
                fail_index: None,
                cancel_on_index: None,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                inits: Mutex::new(Vec::new()),
                chunks: Mutex::new(Vec::new()),
                finalized: Mutex::new(Vec::new()),
                cancelled: Mutex::new(Vec::new()),
                direct: Mutex::new(Vec::new()),
            }
        }
    }

    fn record(size: u64) -> FileRecord {
        FileRecord {
            id: Uuid::new_v4(),
            upload_id: None,
            filename: "f".into(),
            folder_path: "d".into(),
            blob_path: "notes/d/f".into(),
            url: "http://x/notes/d/f".into(),
            file_type: DEFAULT_FILE_TYPE.into(),
            size_bytes: size as i64,
            etag: None,
            uploaded_at: Utc::now(),
        }
    }

    #[async_trait]
    impl UploadTransport for MockTransport {
        async fn init(
            &self,
            req: &InitUploadRequest,
        ) -> Result<InitUploadResponse, TransportError> {
            self.inits.lock().unwrap().push(req.clone());
            Ok(InitUploadResponse {
                upload_id: self.upload_id,
                chunk_size: self.server_chunk_size,
                total_chunks: req.file_size.div_ceil(self.server_chunk_size),
            })
        }

        async fn upload_chunk(
            &self,
            meta: &ChunkMeta,
            chunk: Bytes,
        ) -> Result<ChunkUploadResponse, TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some((index, token)) = &self.cancel_on_index {
                if *index == meta.chunk_index {
                    token.cancel();
                }
            }
            // Later indices in a batch finish first.
            let delay = 5 * (3 - meta.chunk_index % 3);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.chunks
                .lock()
                .unwrap()
                .push((meta.chunk_index, chunk.len()));

            if self.fail_index == Some(meta.chunk_index) {
                return Err(TransportError::Status {
                    status: 502,
                    message: "backend unavailable".into(),
                });
            }
            Ok(ChunkUploadResponse {
                block_id: format!("blk-{}", meta.chunk_index),
            })
        }

        async fn finalize(
            &self,
            req: &FinalizeUploadRequest,
        ) -> Result<FileRecord, TransportError> {
            self.finalized.lock().unwrap().push(req.clone());
            Ok(record(req.file_size))
        }

        async fn cancel(&self, upload_id: Uuid) -> Result<(), TransportError> {
            self.cancelled.lock().unwrap().push(upload_id);
            Ok(())
        }

        async fn upload_direct(
            &self,
            _folder_path: &str,
            filename: &str,
            _file_type: &str,
            data: Bytes,
        ) -> Result<FileRecord, TransportError> {
            self.direct
                .lock()
                .unwrap()
                .push((filename.to_string(), data.len()));
            Ok(record(data.len() as u64))
        }
    }

    fn file_of(len: u64) -> FileUpload<Bytes> {
        FileUpload {
            source: Bytes::from(vec![7u8; len as usize]),
            filename: "clip.mp4".into(),
            file_type: "video/mp4".into(),
            folder_path: "projects/demo".into(),
        }
    }

    fn uploader(transport: MockTransport, chunk_size: u64) -> ChunkedUploader<MockTransport> {
        ChunkedUploader::new(
            transport,
            UploaderOptions {
                chunk_size,
                max_parallel: MAX_PARALLEL_UPLOADS,
            },
        )
    }

    #[tokio::test]
    async fn ten_mib_file_goes_up_as_one_batch_of_three() {
        let up = uploader(MockTransport::new(CHUNK_SIZE), CHUNK_SIZE);
        let record = up
            .upload(&file_of(10 * MIB), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.size_bytes, (10 * MIB) as i64);

        let t = up.transport();
        let mut chunks = t.chunks.lock().unwrap().clone();
        chunks.sort();
        assert_eq!(
            chunks,
            vec![
                (0, (4 * MIB) as usize),
                (1, (4 * MIB) as usize),
                (2, (2 * MIB) as usize)
            ]
        );
        assert_eq!(t.max_in_flight.load(Ordering::SeqCst), 3);

        let finalized = t.finalized.lock().unwrap();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].block_ids, vec!["blk-0", "blk-1", "blk-2"]);
        assert_eq!(finalized[0].file_size, 10 * MIB);
        assert_eq!(finalized[0].upload_id, t.upload_id);
    }

    #[tokio::test]
    async fn block_ids_follow_index_order_and_parallelism_is_bounded() {
        let up = uploader(MockTransport::new(4), 4);
        up.upload(&file_of(26), None, &CancellationToken::new())
            .await
            .unwrap();

        let t = up.transport();
        let completion: Vec<u64> = t.chunks.lock().unwrap().iter().map(|c| c.0).collect();
        assert_eq!(completion.len(), 7);
        assert_ne!(completion, (0..7).collect::<Vec<_>>());
        assert!(t.max_in_flight.load(Ordering::SeqCst) <= MAX_PARALLEL_UPLOADS);

        let expected: Vec<String> = (0..7).map(|i| format!("blk-{i}")).collect();
        assert_eq!(t.finalized.lock().unwrap()[0].block_ids, expected);
    }

    #[tokio::test]
    async fn progress_counts_completed_chunks_monotonically() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let progress: &ProgressFn =
            &move |done: u64, total: u64| sink.lock().unwrap().push((done, total));

        let up = uploader(MockTransport::new(4), 4);
        up.upload(&file_of(26), Some(progress), &CancellationToken::new())
            .await
            .unwrap();

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 7);
        assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(reports.iter().all(|&(_, total)| total == 26));
        assert_eq!(reports.last().unwrap().0, 26);
        // first report is the fastest chunk of the first batch (index 2)
        assert_eq!(reports[0].0, 4);
    }

    #[tokio::test]
    async fn failed_chunk_aborts_before_finalize() {
        let mut transport = MockTransport::new(4);
        transport.fail_index = Some(1);
        let up = uploader(transport, 4);

        let err = up
            .upload(&file_of(12), None, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            UploadClientError::ChunkUpload { index, total, .. } => {
                assert_eq!(index, 1);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let t = up.transport();
        assert!(t.finalized.lock().unwrap().is_empty());
        // the rest of the batch still settled
        assert_eq!(t.chunks.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failure_in_first_batch_stops_later_batches() {
        let mut transport = MockTransport::new(4);
        transport.fail_index = Some(0);
        let up = uploader(transport, 4);
        assert!(up
            .upload(&file_of(40), None, &CancellationToken::new())
            .await
            .is_err());
        assert_eq!(up.transport().chunks.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn size_threshold_selects_path() {
        let up = uploader(MockTransport::new(8), 8);
        up.upload(&file_of(7), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(up.transport().direct.lock().unwrap().len(), 1);
        assert!(up.transport().inits.lock().unwrap().is_empty());

        let up = uploader(MockTransport::new(8), 8);
        up.upload(&file_of(8), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(up.transport().direct.lock().unwrap().is_empty());
        assert_eq!(up.transport().inits.lock().unwrap().len(), 1);
        assert_eq!(
            up.transport().finalized.lock().unwrap()[0].block_ids,
            vec!["blk-0"]
        );
    }

    #[tokio::test]
    async fn server_chunk_size_wins() {
        let up = uploader(MockTransport::new(5), 4);
        up.upload(&file_of(12), None, &CancellationToken::new())
            .await
            .unwrap();
        let mut chunks = up.transport().chunks.lock().unwrap().clone();
        chunks.sort();
        assert_eq!(chunks, vec![(0, 5), (1, 5), (2, 2)]);
    }

    #[tokio::test]
    async fn cancellation_mid_batch_cancels_session() {
        let token = CancellationToken::new();
        let mut transport = MockTransport::new(4);
        transport.cancel_on_index = Some((3, token.clone()));
        let up = uploader(transport, 4);

        let err = up.upload(&file_of(40), None, &token).await.unwrap_err();
        assert!(matches!(err, UploadClientError::Cancelled));

        let t = up.transport();
        assert_eq!(*t.cancelled.lock().unwrap(), vec![t.upload_id]);
        assert!(t.finalized.lock().unwrap().is_empty());
        assert!(t.chunks.lock().unwrap().len() < 10);
    }

    #[tokio::test]
    async fn cancelled_before_start_does_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let up = uploader(MockTransport::new(4), 4);
        let err = up.upload(&file_of(40), None, &token).await.unwrap_err();
        assert!(matches!(err, UploadClientError::Cancelled));
        assert!(up.transport().inits.lock().unwrap().is_empty());
    }
}
