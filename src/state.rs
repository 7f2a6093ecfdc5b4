//! Shared router state. Handlers extract the service they need through
//! `FromRef`.

use crate::services::{folder_service::FolderService, upload_service::UploadService};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub folders: FolderService,
}

impl AppState {
    /// Folder operations share the upload service's database and block store.
    pub fn new(uploads: UploadService) -> Self {
        let folders = FolderService::new(uploads.db.clone(), uploads.store.clone());
        Self { uploads, folders }
    }
}

impl FromRef<AppState> for UploadService {
    fn from_ref(state: &AppState) -> Self {
        state.uploads.clone()
    }
}

impl FromRef<AppState> for FolderService {
    fn from_ref(state: &AppState) -> Self {
        state.folders.clone()
    }
}
