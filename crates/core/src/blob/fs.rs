use super::{BlobError, BlobStore};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Directory-backed store laid out as `<root>/<bucket>/<key>`. Writes go to a
/// sibling temp file that is renamed over the target.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobError> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part);
            let plain = !part.is_empty()
                && rel
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !plain {
                return Err(BlobError::Backend(format!("invalid object path segment {part:?}")));
            }
            path.push(rel);
        }
        Ok(path)
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    fn backend_name(&self) -> &'static str {
        "fs"
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), BlobError> {
        let path = self.object_path(bucket, key)?;
        let backend = |e: std::io::Error| BlobError::Backend(format!("{}: {e}", path.display()));

        let parent = path
            .parent()
            .ok_or_else(|| BlobError::Backend(format!("{} has no parent", path.display())))?;
        tokio::fs::create_dir_all(parent).await.map_err(backend)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(backend(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(backend(e));
        }
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(BlobError::Backend(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("revops-fs-blob-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn round_trips_and_overwrites() {
        let root = scratch_root();
        let store = FsBlobStore::new(&root);
        let key = "pipeline/by-region/data.json";

        store.put("bucket", key, b"[1]".to_vec(), "application/json").await.unwrap();
        store.put("bucket", key, b"[2]".to_vec(), "application/json").await.unwrap();
        assert_eq!(store.get("bucket", key).await.unwrap(), b"[2]".to_vec());

        let mut leftovers = tokio::fs::read_dir(root.join("bucket/pipeline/by-region"))
            .await
            .unwrap();
        let mut names = Vec::new();
        while let Some(entry) = leftovers.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["data.json".to_string()]);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = FsBlobStore::new(scratch_root());
        assert!(matches!(
            store.get("bucket", "pipeline/by-product/data.json").await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let store = FsBlobStore::new(scratch_root());
        assert!(matches!(
            store.put("bucket", "../escape.json", Vec::new(), "application/json").await,
            Err(BlobError::Backend(_))
        ));
        assert!(store.get("/etc", "passwd").await.is_err());
    }
}
