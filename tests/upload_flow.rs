//! End-to-end upload flows against the real router on an ephemeral port.

use bytes::Bytes;
use folio_store::{
    client::{
        ChunkedUploader, Endpoints, FileUpload, HttpTransport, TransportError, UploadClientError,
        UploadTransport, UploaderOptions,
    },
    db,
    models::upload::{FinalizeUploadRequest, InitUploadRequest},
    routes::routes::{BodyLimits, routes},
    services::{
        block_store::LocalBlockStore,
        upload_service::{UploadService, UploadSettings},
    },
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const TEST_CHUNK: u64 = 4 * 1024;
/// Room for one chunk and its multipart fields.
const CHUNK_BODY_LIMIT: usize = 2 * TEST_CHUNK as usize;

struct TestServer {
    base_url: String,
    _dir: TempDir,
}

async fn spawn_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let service = UploadService::new(
        Arc::new(pool),
        Arc::new(LocalBlockStore::new(dir.path())),
        UploadSettings {
            chunk_size: TEST_CHUNK,
            public_base_url: format!("{}/blobs", base_url),
            ..UploadSettings::default()
        },
    );
    let limits = BodyLimits {
        default: CHUNK_BODY_LIMIT,
        files_upload: 10 * TEST_CHUNK as usize + CHUNK_BODY_LIMIT,
    };
    let app = routes(limits).with_state(AppState::new(service));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url,
        _dir: dir,
    }
}

fn uploader(server: &TestServer) -> ChunkedUploader<HttpTransport> {
    let transport = HttpTransport::new(Endpoints::new(server.base_url.clone())).unwrap();
    ChunkedUploader::new(
        transport,
        UploaderOptions {
            chunk_size: TEST_CHUNK,
            max_parallel: 3,
        },
    )
}

fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>())
}

#[tokio::test]
async fn chunked_upload_round_trips_through_blob_url() {
    let server = spawn_server().await;
    let up = uploader(&server);
    let data = payload(10 * 1024);

    let file = FileUpload {
        source: data.clone(),
        filename: "clip.bin".into(),
        file_type: "video/mp4".into(),
        folder_path: "projects/demo".into(),
    };
    let record = up
        .upload(&file, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.size_bytes, data.len() as i64);
    assert_eq!(record.blob_path, "notes/projects/demo/clip.bin");
    assert_eq!(record.file_type, "video/mp4");
    assert!(record.upload_id.is_some());

    let resp = reqwest::get(&record.url).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "video/mp4"
    );
    let body = resp.bytes().await.unwrap();
    assert_eq!(body, data);

    let fetched: serde_json::Value = reqwest::get(format!(
        "{}/notes/files/{}",
        server.base_url, record.id
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    assert_eq!(fetched["fileId"], record.id.to_string());
    assert_eq!(fetched["size"], 10 * 1024);
}

#[tokio::test]
async fn small_file_takes_single_request_path() {
    let server = spawn_server().await;
    let up = uploader(&server);
    let data = payload(100);

    let file = FileUpload {
        source: data.clone(),
        filename: "note.txt".into(),
        file_type: "text/plain".into(),
        folder_path: "inbox".into(),
    };
    let record = up
        .upload(&file, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record.upload_id, None);
    assert_eq!(record.size_bytes, 100);

    let body = reqwest::get(&record.url)
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body, data);
}

#[tokio::test]
async fn finalize_with_incomplete_block_list_is_rejected() {
    let server = spawn_server().await;
    let transport = HttpTransport::new(Endpoints::new(server.base_url.clone())).unwrap();

    let init = transport
        .init(&InitUploadRequest {
            filename: "partial.bin".into(),
            file_type: String::new(),
            file_size: 2 * TEST_CHUNK,
            folder_path: "drafts".into(),
        })
        .await
        .unwrap();
    assert_eq!(init.chunk_size, TEST_CHUNK);
    assert_eq!(init.total_chunks, 2);

    let err = transport
        .finalize(&FinalizeUploadRequest {
            upload_id: init.upload_id,
            filename: "partial.bin".into(),
            folder_path: "drafts".into(),
            file_type: String::new(),
            file_size: 2 * TEST_CHUNK,
            block_ids: vec!["only-one".into()],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 400, .. }));

    let listed: serde_json::Value = reqwest::get(format!(
        "{}/notes/files?folderPath=drafts",
        server.base_url
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    assert_eq!(listed["files"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn cancelled_session_rejects_chunks() {
    let server = spawn_server().await;
    let transport = HttpTransport::new(Endpoints::new(server.base_url.clone())).unwrap();

    let init = transport
        .init(&InitUploadRequest {
            filename: "gone.bin".into(),
            file_type: String::new(),
            file_size: TEST_CHUNK + 1,
            folder_path: "drafts".into(),
        })
        .await
        .unwrap();
    transport.cancel(init.upload_id).await.unwrap();
    // cancelling twice is fine
    transport.cancel(init.upload_id).await.unwrap();

    let meta = folio_store::models::upload::ChunkMeta {
        upload_id: init.upload_id,
        chunk_index: 0,
        total_chunks: init.total_chunks,
        filename: "gone.bin".into(),
        folder_path: "drafts".into(),
        file_type: String::new(),
    };
    let err = transport
        .upload_chunk(&meta, payload(TEST_CHUNK as usize))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 409, .. }));
}

#[tokio::test]
async fn cancelled_token_stops_upload_before_any_request() {
    let server = spawn_server().await;
    let up = uploader(&server);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let file = FileUpload {
        source: payload(3 * TEST_CHUNK as usize),
        filename: "never.bin".into(),
        file_type: String::new(),
        folder_path: "drafts".into(),
    };
    let err = up.upload(&file, None, &cancel).await.unwrap_err();
    assert!(matches!(err, UploadClientError::Cancelled));
}

#[tokio::test]
async fn files_can_be_listed_and_deleted() {
    let server = spawn_server().await;
    let up = uploader(&server);
    let client = reqwest::Client::new();

    for name in ["a.txt", "b.txt"] {
        let file = FileUpload {
            source: payload(10),
            filename: name.into(),
            file_type: "text/plain".into(),
            folder_path: "shared".into(),
        };
        up.upload(&file, None, &CancellationToken::new())
            .await
            .unwrap();
    }

    let missing = client
        .get(format!("{}/notes/files", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);

    let all: serde_json::Value = client
        .get(format!("{}/notes/files/all", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let files = all["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);

    let id = files[0]["fileId"].as_str().unwrap().to_string();
    let url = files[0]["url"].as_str().unwrap().to_string();
    let deleted = client
        .delete(format!("{}/notes/files/{}", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);

    let gone = client
        .get(format!("{}/notes/files/{}", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), 404);
    assert_eq!(client.get(url).send().await.unwrap().status(), 404);

    let health = client
        .get(format!("{}/readyz", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);
}

#[tokio::test]
async fn multi_file_upload_may_exceed_the_chunk_body_limit() {
    let server = spawn_server().await;
    let mut form = reqwest::multipart::Form::new().text("folderPath", "batch");
    for i in 0..3 {
        let part = reqwest::multipart::Part::bytes(payload(3 * 1024).to_vec())
            .file_name(format!("{i}.bin"))
            .mime_str("application/octet-stream")
            .unwrap();
        form = form.part("files", part);
    }

    let resp = reqwest::Client::new()
        .post(format!("{}/notes/files/upload", server.base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["files"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn malformed_file_type_still_uploads_small_file() {
    let server = spawn_server().await;
    let up = uploader(&server);
    let file = FileUpload {
        source: payload(50),
        filename: "odd.dat".into(),
        file_type: "definitely not a mime".into(),
        folder_path: "inbox".into(),
    };
    let record = up
        .upload(&file, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record.file_type, "application/octet-stream");
    assert_eq!(record.size_bytes, 50);
}

#[tokio::test]
async fn folders_can_be_created_listed_and_deleted_with_their_files() {
    let server = spawn_server().await;
    let up = uploader(&server);
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{}/notes/folder/create", server.base_url))
        .json(&serde_json::json!({ "name": "projects" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: serde_json::Value = created.json().await.unwrap();
    let folder_id = created["folder"]["folderId"].as_str().unwrap().to_string();

    let child = client
        .post(format!("{}/notes/folder/create", server.base_url))
        .json(&serde_json::json!({ "name": "demo", "parentPath": "projects" }))
        .send()
        .await
        .unwrap();
    assert_eq!(child.status(), 201);

    let duplicate = client
        .post(format!("{}/notes/folder/create", server.base_url))
        .json(&serde_json::json!({ "name": "projects" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    let nameless = client
        .post(format!("{}/notes/folder/create", server.base_url))
        .json(&serde_json::json!({ "parentPath": "projects" }))
        .send()
        .await
        .unwrap();
    assert_eq!(nameless.status(), 400);

    let children: serde_json::Value = client
        .get(format!("{}/notes/folders?parentPath=projects", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(children["folders"][0]["path"], "projects/demo");

    let file = FileUpload {
        source: payload(3 * TEST_CHUNK as usize),
        filename: "clip.bin".into(),
        file_type: String::new(),
        folder_path: "projects/demo".into(),
    };
    let record = up
        .upload(&file, None, &CancellationToken::new())
        .await
        .unwrap();

    let deleted = client
        .delete(format!("{}/notes/folders/{}", server.base_url, folder_id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);
    let deleted: serde_json::Value = deleted.json().await.unwrap();
    assert_eq!(deleted["deletedFolders"], 2);
    assert_eq!(deleted["deletedFiles"], 1);

    assert_eq!(client.get(&record.url).send().await.unwrap().status(), 404);
    let tree: serde_json::Value = client
        .get(format!("{}/notes/folders/tree", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(tree["folders"].as_array().unwrap().is_empty());
}
