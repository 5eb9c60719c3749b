use crate::blob::{BlobError, BlobStore};
use crate::domain::sales::ResultSet;
use crate::error::{PipelineError, PipelineResult};
use serde_json::Value;
use std::sync::Arc;

/// Read side of the published snapshots. Returns whatever the last run wrote.
#[derive(Clone)]
pub struct SnapshotReader {
    store: Arc<dyn BlobStore>,
    bucket: String,
}

impl SnapshotReader {
    pub fn new(store: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub async fn read(&self, result_set: ResultSet) -> PipelineResult<Value> {
        let key = result_set.object_key();
        let bytes = self
            .store
            .get(&self.bucket, &key)
            .await
            .map_err(|e| match e {
                BlobError::NotFound { .. } => PipelineError::NotFound(format!(
                    "no {result_set} snapshot has been published to {}/{key}",
                    self.bucket
                )),
                BlobError::Backend(detail) => PipelineError::ReadError(detail),
            })?;

        serde_json::from_slice(&bytes).map_err(|e| {
            PipelineError::ReadError(format!("{}/{key} is not valid JSON: {e}", self.bucket))
        })
    }
}
