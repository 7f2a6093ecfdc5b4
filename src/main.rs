use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use folio_store::{
    client::{
        ChunkedUploader, Endpoints, FileSource, FileUpload, HttpTransport, ProgressFn,
        UploaderOptions,
    },
    config::{AppConfig, Mode, UploadArgs},
    db,
    routes,
    services::{
        block_store::LocalBlockStore,
        upload_service::{UploadService, UploadSettings},
    },
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    if let Mode::Upload(args) = mode {
        return run_upload(&cfg, args).await;
    }

    tracing::info!("Starting folio-store with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if db_path != ":memory:" {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path_obj)
        {
            Ok(_) => tracing::debug!("Database file can be created/opened."),
            Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );

    db::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if matches!(mode, Mode::Migrate) {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let store = Arc::new(LocalBlockStore::new(cfg.storage_dir.clone()));
    let settings = UploadSettings {
        chunk_size: cfg.chunk_size,
        public_base_url: cfg.public_base_url.clone(),
        session_ttl: chrono::Duration::seconds(cfg.session_ttl_secs.min(u32::MAX as u64) as i64),
        ..UploadSettings::default()
    };
    let service = UploadService::new(db.clone(), store, settings);

    spawn_session_sweeper(service.clone(), Duration::from_secs(cfg.sweep_interval_secs));

    // --- Build router ---
    let app: Router =
        routes::routes::routes(cfg.body_limits()).with_state(AppState::new(service));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically expire abandoned upload sessions.
fn spawn_session_sweeper(service: UploadService, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match service.sweep_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Expired {} stale upload sessions", n),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
        }
    });
}

/// `folio-store upload <file>`: push one local file to a running server.
async fn run_upload(cfg: &AppConfig, args: UploadArgs) -> Result<()> {
    let source = FileSource::open(&args.file)
        .await
        .with_context(|| format!("opening {}", args.file.display()))?;
    let filename = source
        .file_name()
        .with_context(|| format!("{} has no file name", args.file.display()))?;

    let server = args.server_url();
    let transport = HttpTransport::new(Endpoints::new(server.clone()))?;
    let uploader = ChunkedUploader::new(
        transport,
        UploaderOptions {
            chunk_size: args.chunk_size.unwrap_or(cfg.chunk_size),
            max_parallel: args.parallel.max(1),
        },
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling upload");
            on_ctrl_c.cancel();
        }
    });

    let progress: &ProgressFn = &|done: u64, total: u64| {
        let pct = if total == 0 { 100 } else { done * 100 / total };
        tracing::info!("Uploaded {}/{} bytes ({}%)", done, total, pct);
    };

    tracing::info!(
        "Uploading {} to {} as {}/{}",
        args.file.display(),
        server,
        args.folder,
        filename
    );
    let upload = FileUpload {
        source,
        filename,
        file_type: args.file_type.clone().unwrap_or_default(),
        folder_path: args.folder.clone(),
    };
    let record = uploader.upload(&upload, Some(progress), &cancel).await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
