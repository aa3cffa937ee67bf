//! Artifact object storage
//!
//! Packaged artifacts are uploaded to a bucket before the model resource that
//! serves them is registered.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Object store holding uploaded artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create the bucket if missing
    async fn ensure_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Delete every object in the bucket, then the bucket itself
    async fn remove_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Upload a local file and return its URL
    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<String>;

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;

    fn object_url(&self, bucket: &str, key: &str) -> String;
}

/// Object store backed by a local directory, one subdirectory per bucket
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    async fn bucket_exists(&self, bucket: &str) -> bool {
        tokio::fs::try_exists(self.root.join(bucket))
            .await
            .unwrap_or(false)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn ensure_bucket(&self, bucket: &str) -> StoreResult<()> {
        let path = self.root.join(bucket);
        if self.bucket_exists(bucket).await {
            info!(bucket, "Found existing bucket");
            return Ok(());
        }
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        info!(bucket, path = %path.display(), "Created artifact bucket");
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> StoreResult<()> {
        let path = self.root.join(bucket);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                info!(bucket, "Removed artifact bucket");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NoSuchBucket(bucket.to_string()))
            }
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<String> {
        if !self.bucket_exists(bucket).await {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        let dest = self.object_path(bucket, key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        tokio::fs::copy(source, &dest)
            .await
            .map_err(|e| StoreError::io(source, e))?;

        debug!(bucket, key, "Uploaded artifact");
        Ok(self.object_url(bucket, key))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let path = self.object_path(bucket, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("file://{}", self.object_path(bucket, key).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("model.tar.gz");
        std::fs::write(&source, b"pkg").unwrap();

        let store = FsArtifactStore::new(dir.path().join("objects"));
        store.ensure_bucket("models").await.unwrap();
        store.ensure_bucket("models").await.unwrap();

        let url = store
            .upload("models", "m1/1/artifact.tar.gz", &source)
            .await
            .unwrap();
        let path = store.object_path("models", "m1/1/artifact.tar.gz");
        assert!(url.ends_with("m1/1/artifact.tar.gz"));
        assert_eq!(std::fs::read(&path).unwrap(), b"pkg");

        store.delete("models", "m1/1/artifact.tar.gz").await.unwrap();
        let err = store.delete("models", "m1/1/artifact.tar.gz").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upload_requires_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let err = store
            .upload("missing", "k", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchBucket(_)));
    }

    #[tokio::test]
    async fn test_remove_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        store.ensure_bucket("models").await.unwrap();
        store.remove_bucket("models").await.unwrap();
        assert!(matches!(
            store.remove_bucket("models").await,
            Err(StoreError::NoSuchBucket(_))
        ));
    }
}
