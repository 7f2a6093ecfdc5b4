//! Core data models for the folio upload service.
//!
//! `FileRecord`, `Folder` and `UploadSession` map onto SQLite tables via
//! `sqlx::FromRow`; the `upload` module holds the JSON wire types shared by
//! the HTTP handlers and the client uploader.

pub mod file_record;
pub mod folder;
pub mod upload;
pub mod upload_session;
