//! Byte-range readable inputs for the uploader.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    ops::Range,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt},
};

/// A file handle the uploader can slice into chunks. Ranges may be read
/// concurrently.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes>;
}

fn check_range(range: &Range<u64>, len: u64) -> io::Result<()> {
    if range.start > range.end || range.end > len {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("range {}..{} outside source of {} bytes", range.start, range.end, len),
        ));
    }
    Ok(())
}

#[async_trait]
impl ChunkSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        check_range(&range, ChunkSource::len(self))?;
        Ok(self.slice(range.start as usize..range.end as usize))
    }
}

/// A file on local disk. Each read opens its own handle so concurrent
/// chunk reads do not share a cursor.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            path,
            len: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used as the uploaded filename.
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        check_range(&range, self.len)?;
        let mut file = File::open(&self.path).await?;
        file.seek(io::SeekFrom::Start(range.start)).await?;
        let mut buffer = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}
