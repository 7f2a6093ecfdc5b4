pub mod block_store;
pub mod folder_service;
pub mod upload_service;
