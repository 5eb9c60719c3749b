use crate::blob::{BlobStore, JSON_CONTENT_TYPE};
use crate::domain::sales::ResultSet;
use crate::error::{PipelineError, PipelineResult};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub result_set: ResultSet,
    pub key: String,
    pub records: usize,
    pub bytes: usize,
}

/// Writes result sets to their fixed snapshot keys.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn BlobStore>,
    bucket: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Serializes `records` as one JSON array, in the given order, and replaces
    /// the snapshot with a single write.
    pub async fn publish<T>(&self, result_set: ResultSet, records: &[T]) -> PipelineResult<PublishReceipt>
    where
        T: Serialize + Sync,
    {
        let key = result_set.object_key();
        let body = serde_json::to_vec(records).map_err(|e| {
            PipelineError::PublishError(format!("failed to serialize {result_set}: {e}"))
        })?;
        let bytes = body.len();

        self.store
            .put(&self.bucket, &key, body, JSON_CONTENT_TYPE)
            .await
            .map_err(|e| PipelineError::PublishError(format!("{}/{key}: {e}", self.bucket)))?;

        tracing::info!(
            backend = self.store.backend_name(),
            bucket = %self.bucket,
            %key,
            records = records.len(),
            bytes,
            "published snapshot"
        );

        Ok(PublishReceipt {
            result_set,
            key,
            records: records.len(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::domain::summary::ProductSummary;

    #[tokio::test]
    async fn writes_json_array_to_fixed_key() {
        let store = Arc::new(MemoryBlobStore::new());
        let publisher = Publisher::new(store.clone(), "revops-processed");
        let rows = vec![ProductSummary {
            product: "Widget".to_string(),
            total_amount: 10.0,
            deal_count: 1,
            avg_deal_size: Some(10.0),
        }];

        let receipt = publisher.publish(ResultSet::ByProduct, &rows).await.unwrap();
        assert_eq!(receipt.key, "pipeline/by-product/data.json");
        assert_eq!(receipt.records, 1);

        let bytes = store.get("revops-processed", &receipt.key).await.unwrap();
        assert_eq!(bytes.len(), receipt.bytes);
        assert!(bytes.starts_with(b"[{\"product\":\"Widget\""));
        assert_eq!(
            store.content_type("revops-processed", &receipt.key).as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn empty_result_set_publishes_empty_array() {
        let store = Arc::new(MemoryBlobStore::new());
        let publisher = Publisher::new(store.clone(), "b");
        publisher
            .publish::<ProductSummary>(ResultSet::ByRegion, &[])
            .await
            .unwrap();
        assert_eq!(
            store.get("b", "pipeline/by-region/data.json").await.unwrap(),
            b"[]".to_vec()
        );
    }

    #[tokio::test]
    async fn storage_failure_is_a_publish_error() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_writes_to("pipeline/by-region/data.json");
        let publisher = Publisher::new(store, "b");

        let err = publisher
            .publish::<ProductSummary>(ResultSet::ByRegion, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PublishError(_)));
    }
}
