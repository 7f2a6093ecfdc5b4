//! Network side of the uploader: the `UploadTransport` seam and its
//! reqwest-backed implementation.

use crate::{
    models::{
        file_record::FileRecord,
        upload::{
            ChunkMeta, ChunkUploadResponse, FinalizeUploadRequest, FinalizeUploadResponse,
            InitUploadRequest, InitUploadResponse, UploadFilesResponse,
        },
    },
    routes::routes::{
        CANCEL_PATH_PREFIX, CHUNK_PATH, FILES_UPLOAD_PATH, FINALIZE_PATH, INIT_PATH,
    },
    services::upload_service::DEFAULT_FILE_TYPE,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client, RequestBuilder,
    multipart::{Form, Part},
};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// The four calls the uploader makes against the session handler.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn init(&self, req: &InitUploadRequest) -> Result<InitUploadResponse, TransportError>;

    async fn upload_chunk(
        &self,
        meta: &ChunkMeta,
        chunk: Bytes,
    ) -> Result<ChunkUploadResponse, TransportError>;

    async fn finalize(&self, req: &FinalizeUploadRequest) -> Result<FileRecord, TransportError>;

    async fn cancel(&self, upload_id: Uuid) -> Result<(), TransportError>;

    /// Single-shot multipart upload for files below the chunk threshold.
    async fn upload_direct(
        &self,
        folder_path: &str,
        filename: &str,
        file_type: &str,
        data: Bytes,
    ) -> Result<FileRecord, TransportError>;
}

/// Endpoint URLs derived from one server base URL.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn init(&self) -> String {
        format!("{}{}", self.base_url, INIT_PATH)
    }

    pub fn chunk(&self) -> String {
        format!("{}{}", self.base_url, CHUNK_PATH)
    }

    pub fn finalize(&self) -> String {
        format!("{}{}", self.base_url, FINALIZE_PATH)
    }

    pub fn cancel(&self, upload_id: Uuid) -> String {
        format!("{}{}/{}/cancel", self.base_url, CANCEL_PATH_PREFIX, upload_id)
    }

    pub fn files_upload(&self) -> String {
        format!("{}{}", self.base_url, FILES_UPLOAD_PATH)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpTransport {
    client: Client,
    endpoints: Endpoints,
}

impl HttpTransport {
    pub fn new(endpoints: Endpoints) -> Result<Self, TransportError> {
        let client = Client::builder().build()?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, TransportError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn init(&self, req: &InitUploadRequest) -> Result<InitUploadResponse, TransportError> {
        Self::send_json(self.client.post(self.endpoints.init()).json(req)).await
    }

    async fn upload_chunk(
        &self,
        meta: &ChunkMeta,
        chunk: Bytes,
    ) -> Result<ChunkUploadResponse, TransportError> {
        let form = Form::new()
            .text("uploadId", meta.upload_id.to_string())
            .text("chunkIndex", meta.chunk_index.to_string())
            .text("totalChunks", meta.total_chunks.to_string())
            .text("filename", meta.filename.clone())
            .text("folderPath", meta.folder_path.clone())
            .text("fileType", meta.file_type.clone())
            .part("chunk", Part::bytes(chunk.to_vec()).file_name("blob"));
        Self::send_json(self.client.post(self.endpoints.chunk()).multipart(form)).await
    }

    async fn finalize(&self, req: &FinalizeUploadRequest) -> Result<FileRecord, TransportError> {
        let resp: FinalizeUploadResponse =
            Self::send_json(self.client.post(self.endpoints.finalize()).json(req)).await?;
        Ok(resp.file)
    }

    async fn cancel(&self, upload_id: Uuid) -> Result<(), TransportError> {
        let _: serde_json::Value =
            Self::send_json(self.client.post(self.endpoints.cancel(upload_id))).await?;
        Ok(())
    }

    async fn upload_direct(
        &self,
        folder_path: &str,
        filename: &str,
        file_type: &str,
        data: Bytes,
    ) -> Result<FileRecord, TransportError> {
        let part = file_part(data, filename, file_type)?;
        let form = Form::new()
            .text("folderPath", folder_path.to_string())
            .part("files", part);
        let resp: UploadFilesResponse =
            Self::send_json(self.client.post(self.endpoints.files_upload()).multipart(form))
                .await?;
        resp.files
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Unexpected("no file in upload response".into()))
    }
}

/// Multipart file part carrying `file_type`, or the default type when the
/// declared one is not a valid MIME string.
fn file_part(data: Bytes, filename: &str, file_type: &str) -> Result<Part, TransportError> {
    let part = || Part::bytes(data.to_vec()).file_name(filename.to_string());
    match part().mime_str(file_type) {
        Ok(part) => Ok(part),
        Err(_) => {
            debug!(
                "declared type `{}` for {} is not a MIME type, sending {}",
                file_type, filename, DEFAULT_FILE_TYPE
            );
            Ok(part().mime_str(DEFAULT_FILE_TYPE)?)
        }
    }
}
