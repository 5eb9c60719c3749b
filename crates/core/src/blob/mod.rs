use crate::config::{BlobBackend, Settings};
use std::sync::Arc;
use thiserror::Error;

pub mod fs;
pub mod memory;
pub mod s3;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object {bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },

    #[error("{0}")]
    Backend(String),
}

/// Object storage with whole-object writes: a `put` replaces the object in a
/// single step, so readers see either the previous or the new bytes.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError>;
}

pub async fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match settings.blob_backend {
        BlobBackend::S3 => Arc::new(S3BlobStore::from_env().await),
        BlobBackend::Fs => Arc::new(FsBlobStore::new(&settings.blob_fs_root)),
    };
    tracing::info!(backend = store.backend_name(), "blob store ready");
    Ok(store)
}
