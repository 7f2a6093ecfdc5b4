use crate::{
    client::MAX_PARALLEL_UPLOADS,
    routes::routes::BodyLimits,
    services::upload_service::{DEFAULT_CHUNK_SIZE, MAX_FILES_PER_REQUEST},
};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, str::FromStr};

const MULTIPART_ENVELOPE_BYTES: usize = 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Prefix of the URLs recorded for committed files.
    pub public_base_url: String,
    pub chunk_size: u64,
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked file upload service for notes and attachments")]
pub struct Args {
    /// Host to bind to (overrides FOLIO_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FOLIO_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs and staged blocks are stored (overrides FOLIO_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FOLIO_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public URL prefix for committed blobs (overrides FOLIO_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Chunk size in bytes announced to clients (overrides FOLIO_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a local file to a running server
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct UploadArgs {
    /// File to upload
    pub file: PathBuf,

    /// Target folder path (e.g. `projects/demo`)
    #[arg(long)]
    pub folder: String,

    /// Server base URL (overrides FOLIO_SERVER_URL)
    #[arg(long)]
    pub server: Option<String>,

    /// MIME type to declare; defaults to application/octet-stream
    #[arg(long)]
    pub file_type: Option<String>,

    /// Maximum chunk uploads in flight
    #[arg(long, default_value_t = MAX_PARALLEL_UPLOADS)]
    pub parallel: usize,

    /// Split size used to pick the single-shot or chunked path
    #[arg(long)]
    pub chunk_size: Option<u64>,
}

/// What the binary was asked to do.
#[derive(Debug)]
pub enum Mode {
    Serve,
    Migrate,
    Upload(UploadArgs),
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        // Parse CLI once
        let args = Args::parse();
        let cfg = Self::resolve(&args, |name| env::var(name).ok())?;

        let mode = match args.command {
            Some(Command::Upload(upload)) => Mode::Upload(upload),
            None if args.migrate => Mode::Migrate,
            None => Mode::Serve,
        };
        Ok((cfg, mode))
    }

    /// Merge CLI args over values from `lookup` (environment) over defaults.
    pub fn resolve(args: &Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = lookup("FOLIO_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "FOLIO_PORT", 3000u16)?;
        let env_storage = lookup("FOLIO_STORAGE_DIR").unwrap_or_else(|| "./data/blobs".into());
        let env_db = lookup("FOLIO_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/folio.db".into());
        let env_chunk = parse_var(&lookup, "FOLIO_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let session_ttl_secs = parse_var(&lookup, "FOLIO_SESSION_TTL_SECS", 86_400u64)?;
        let sweep_interval_secs = parse_var(&lookup, "FOLIO_SWEEP_INTERVAL_SECS", 3_600u64)?;

        // --- Merge ---
        let host = args.host.clone().unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_base_url = args
            .public_base_url
            .clone()
            .or_else(|| lookup("FOLIO_PUBLIC_BASE_URL"))
            .unwrap_or_else(|| format!("http://{}:{}/blobs", host, port));

        let cfg = Self {
            host,
            port,
            storage_dir: args.storage_dir.clone().unwrap_or(env_storage),
            database_url: args.database_url.clone().unwrap_or(env_db),
            public_base_url,
            chunk_size: args.chunk_size.unwrap_or(env_chunk),
            session_ttl_secs,
            sweep_interval_secs,
        };

        if cfg.chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }
        if cfg.sweep_interval_secs == 0 {
            bail!("FOLIO_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Request body caps: one chunk plus room for the multipart envelope,
    /// and a full batch of files below the chunk threshold for the
    /// single-shot upload route.
    pub fn body_limits(&self) -> BodyLimits {
        let chunk = usize::try_from(self.chunk_size).unwrap_or(usize::MAX);
        BodyLimits {
            default: chunk.saturating_add(MULTIPART_ENVELOPE_BYTES),
            files_upload: chunk
                .saturating_mul(MAX_FILES_PER_REQUEST)
                .saturating_add(MULTIPART_ENVELOPE_BYTES),
        }
    }
}

impl UploadArgs {
    pub fn server_url(&self) -> String {
        self.server
            .clone()
            .or_else(|| env::var("FOLIO_SERVER_URL").ok())
            .unwrap_or_else(|| "http://127.0.0.1:3000".into())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}
