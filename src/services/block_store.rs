//! src/services/block_store.rs
//!
//! Block storage backend. Exposes the two primitives the upload coordinator
//! relies on (stage a block and get back an opaque id; commit an ordered list
//! of block ids into one durable blob) plus plain blob put/get/delete.
//!
//! `LocalBlockStore` emulates block-blob semantics on local disk:
//! staged blocks live under `base_path/.staging/{upload_id}/{block_id}` and
//! committed blobs under `base_path/{blob_path}`. A committed block list is
//! assembled inside the staging area and only replaces the live blob when
//! it is published.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWriteExt},
    sync::RwLock,
};
use tracing::debug;
use uuid::Uuid;

const STAGING_DIR: &str = ".staging";
/// Name of the assembled blob inside a staging area. Never a valid block id.
const ASSEMBLED_BLOB: &str = ".assembled";
const STAGING_LOCK_STRIPES: usize = 64;
const MAX_BLOB_PATH_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum BlockStoreError {
    #[error("staging area for upload `{0}` not found")]
    StagingNotFound(Uuid),
    #[error("block `{0}` is not staged")]
    BlockNotFound(String),
    #[error("block id `{0}` is malformed")]
    InvalidBlockId(String),
    #[error("blob `{0}` not found")]
    BlobNotFound(String),
    #[error("invalid blob path `{0}`")]
    InvalidPath(String),
    #[error("assembled size {actual} does not match declared size {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlockStoreResult<T> = Result<T, BlockStoreError>;

/// A blob that has been durably written.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedBlob {
    pub blob_path: String,
    pub size: u64,
    pub etag: String,
}

/// Readable handle on a committed blob.
pub struct BlobReader {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub size: u64,
}

#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Open a staging area that subsequent `stage_block` calls write into.
    async fn open_staging(&self, upload_id: Uuid) -> BlockStoreResult<()>;

    /// Stage one block and return the backend-issued block id.
    /// Re-staging the same index replaces the earlier block.
    async fn stage_block(
        &self,
        upload_id: Uuid,
        chunk_index: u64,
        data: Bytes,
    ) -> BlockStoreResult<String>;

    /// Assemble staged blocks, in the given order, into a pending blob for
    /// `blob_path`. Fails unless every block exists and the assembled length
    /// equals `expected_size`. Nothing at `blob_path` changes until
    /// `publish_blob`; on failure the staged blocks are left untouched.
    async fn commit_block_list(
        &self,
        upload_id: Uuid,
        blob_path: &str,
        block_ids: &[String],
        expected_size: u64,
    ) -> BlockStoreResult<CommittedBlob>;

    /// Move the blob assembled by `commit_block_list` to `blob_path`,
    /// replacing any existing blob, and release the staging area.
    async fn publish_blob(&self, upload_id: Uuid, blob_path: &str) -> BlockStoreResult<()>;

    /// Discard a staging area and all its blocks. Missing areas are ignored.
    async fn abort_staging(&self, upload_id: Uuid) -> BlockStoreResult<()>;

    /// Write a whole blob in one shot.
    async fn put_blob(&self, blob_path: &str, data: Bytes) -> BlockStoreResult<CommittedBlob>;

    async fn open_blob(&self, blob_path: &str) -> BlockStoreResult<BlobReader>;

    /// Delete a blob. Missing blobs are ignored.
    async fn delete_blob(&self, blob_path: &str) -> BlockStoreResult<()>;

    /// Readiness check: a write/read/delete round trip.
    async fn probe(&self) -> BlockStoreResult<()>;
}

#[derive(Clone, Debug)]
pub struct LocalBlockStore {
    base_path: PathBuf,
    /// Staging writes hold a read guard, removal of a staging area holds the
    /// write guard, so no block lands in an area that is being discarded.
    staging_locks: Arc<[RwLock<()>]>,
}

impl LocalBlockStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            staging_locks: (0..STAGING_LOCK_STRIPES).map(|_| RwLock::new(())).collect(),
        }
    }

    fn staging_lock(&self, upload_id: Uuid) -> &RwLock<()> {
        let stripe = (upload_id.as_u128() % self.staging_locks.len() as u128) as usize;
        &self.staging_locks[stripe]
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn staging_root(&self, upload_id: Uuid) -> PathBuf {
        self.base_path
            .join(STAGING_DIR)
            .join(upload_id.simple().to_string())
    }

    /// Resolve a blob path beneath `base_path`, rejecting traversal and the
    /// reserved staging prefix.
    fn blob_file(&self, blob_path: &str) -> BlockStoreResult<PathBuf> {
        let invalid = || BlockStoreError::InvalidPath(blob_path.to_string());
        if blob_path.is_empty() || blob_path.len() > MAX_BLOB_PATH_LEN {
            return Err(invalid());
        }
        if blob_path.starts_with('/') || blob_path.contains('\\') {
            return Err(invalid());
        }
        if blob_path.bytes().any(|b| b.is_ascii_control()) {
            return Err(invalid());
        }
        let mut path = self.base_path.clone();
        for (i, segment) in blob_path.split('/').enumerate() {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(invalid());
            }
            if i == 0 && segment == STAGING_DIR {
                return Err(invalid());
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn block_file(&self, upload_id: Uuid, block_id: &str) -> BlockStoreResult<PathBuf> {
        match URL_SAFE_NO_PAD.decode(block_id) {
            Ok(raw) if !raw.is_empty() => Ok(self.staging_root(upload_id).join(block_id)),
            _ => Err(BlockStoreError::InvalidBlockId(block_id.to_string())),
        }
    }
}

/// Block ids follow the block-blob convention of base64-encoded, fixed-width
/// strings so that every id in one blob has the same length.
fn block_id_for(chunk_index: u64) -> String {
    URL_SAFE_NO_PAD.encode(format!("block-{:010}", chunk_index))
}

/// Write `data` to `target` via a temp file in the same directory, fsync,
/// then rename into place.
async fn write_atomic(target: &Path, data: &[u8]) -> io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(ErrorKind::Other, "blob path missing parent directory"))?;
    fs::create_dir_all(parent).await?;
    write_in_dir(parent, target, data).await
}

/// Like `write_atomic`, but `dir` must already exist.
async fn write_in_dir(dir: &Path, target: &Path, data: &[u8]) -> io::Result<()> {
    let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
    let mut file = File::create(&tmp_path).await?;
    let result = async {
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err);
    }
    rename_into_place(&tmp_path, target).await
}

async fn rename_into_place(tmp_path: &Path, target: &Path) -> io::Result<()> {
    if let Err(err) = fs::rename(tmp_path, target).await {
        if err.kind() == ErrorKind::AlreadyExists {
            fs::remove_file(target).await?;
            fs::rename(tmp_path, target).await?;
        } else {
            let _ = fs::remove_file(tmp_path).await;
            return Err(err);
        }
    }
    Ok(())
}

#[async_trait]
impl BlockStore for LocalBlockStore {
    async fn open_staging(&self, upload_id: Uuid) -> BlockStoreResult<()> {
        fs::create_dir_all(self.staging_root(upload_id)).await?;
        Ok(())
    }

    async fn stage_block(
        &self,
        upload_id: Uuid,
        chunk_index: u64,
        data: Bytes,
    ) -> BlockStoreResult<String> {
        let _guard = self.staging_lock(upload_id).read().await;
        let root = self.staging_root(upload_id);
        let block_id = block_id_for(chunk_index);
        match write_in_dir(&root, &root.join(&block_id), &data).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BlockStoreError::StagingNotFound(upload_id));
            }
            Err(err) => return Err(BlockStoreError::Io(err)),
        }
        debug!(
            "staged block {} ({} bytes) for upload {}",
            block_id,
            data.len(),
            upload_id
        );
        Ok(block_id)
    }

    async fn commit_block_list(
        &self,
        upload_id: Uuid,
        blob_path: &str,
        block_ids: &[String],
        expected_size: u64,
    ) -> BlockStoreResult<CommittedBlob> {
        self.blob_file(blob_path)?;
        let _guard = self.staging_lock(upload_id).write().await;
        let root = self.staging_root(upload_id);
        if !fs::try_exists(&root).await? {
            return Err(BlockStoreError::StagingNotFound(upload_id));
        }

        let mut block_files = Vec::with_capacity(block_ids.len());
        for block_id in block_ids {
            let path = self.block_file(upload_id, block_id)?;
            if !fs::try_exists(&path).await? {
                return Err(BlockStoreError::BlockNotFound(block_id.clone()));
            }
            block_files.push(path);
        }

        let tmp_path = root.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: u64 = 0;
        let mut digest = Context::new();
        for path in &block_files {
            let block = match fs::read(path).await {
                Ok(block) => block,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(BlockStoreError::Io(err));
                }
            };
            size += block.len() as u64;
            digest.consume(&block);
            if let Err(err) = file.write_all(&block).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlockStoreError::Io(err));
            }
        }

        if size != expected_size {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlockStoreError::SizeMismatch {
                expected: expected_size,
                actual: size,
            });
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlockStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlockStoreError::Io(err));
        }
        drop(file);
        rename_into_place(&tmp_path, &root.join(ASSEMBLED_BLOB)).await?;

        Ok(CommittedBlob {
            blob_path: blob_path.to_string(),
            size,
            etag: format!("{:x}", digest.compute()),
        })
    }

    async fn publish_blob(&self, upload_id: Uuid, blob_path: &str) -> BlockStoreResult<()> {
        let target = self.blob_file(blob_path)?;
        let _guard = self.staging_lock(upload_id).write().await;
        let root = self.staging_root(upload_id);
        let assembled = root.join(ASSEMBLED_BLOB);
        if !fs::try_exists(&assembled).await? {
            return Err(BlockStoreError::StagingNotFound(upload_id));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        rename_into_place(&assembled, &target).await?;
        debug!("published {} for upload {}", blob_path, upload_id);

        if let Err(err) = fs::remove_dir_all(&root).await {
            debug!("failed to clear staging for {}: {}", upload_id, err);
        }
        Ok(())
    }

    async fn abort_staging(&self, upload_id: Uuid) -> BlockStoreResult<()> {
        let _guard = self.staging_lock(upload_id).write().await;
        match fs::remove_dir_all(self.staging_root(upload_id)).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlockStoreError::Io(err)),
        }
    }

    async fn put_blob(&self, blob_path: &str, data: Bytes) -> BlockStoreResult<CommittedBlob> {
        let target = self.blob_file(blob_path)?;
        write_atomic(&target, &data).await?;
        Ok(CommittedBlob {
            blob_path: blob_path.to_string(),
            size: data.len() as u64,
            etag: format!("{:x}", md5::compute(&data)),
        })
    }

    async fn open_blob(&self, blob_path: &str) -> BlockStoreResult<BlobReader> {
        let path = self.blob_file(blob_path)?;
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BlockStoreError::BlobNotFound(blob_path.to_string())
            } else {
                BlockStoreError::Io(err)
            }
        })?;
        let size = file.metadata().await?.len();
        Ok(BlobReader {
            reader: Box::new(file),
            size,
        })
    }

    async fn delete_blob(&self, blob_path: &str) -> BlockStoreResult<()> {
        let path = self.blob_file(blob_path)?;
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed blob {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", path.display());
            }
            Err(err) => return Err(BlockStoreError::Io(err)),
        }
        Ok(())
    }

    async fn probe(&self) -> BlockStoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes? != b"readyz" {
            return Err(BlockStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "probe file content mismatch",
            )));
        }
        Ok(())
    }
}
