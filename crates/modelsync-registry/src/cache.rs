//! On-disk artifact cache
//!
//! Packaged artifacts live at `{root}/{model}/{version}/model.tar.gz`. A
//! version whose package is already present is never fetched again, which is
//! what makes `fetch_version_artifact` idempotent across ticks.

use crate::error::{RegistryError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use modelsync_types::Artifact;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// File whose presence marks the root of a model directory
pub const MODEL_MARKER: &str = "MLmodel";

const ARTIFACT_FILE: &str = "model.tar.gz";

/// Cache of packaged artifacts keyed by model and version
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove everything cached and recreate an empty root
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => info!(path = %self.root.display(), "Cleared artifact cache"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RegistryError::io(&self.root, e)),
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RegistryError::io(&self.root, e))
    }

    pub fn version_dir(&self, model_name: &str, version_id: &str) -> PathBuf {
        self.root.join(model_name).join(version_id)
    }

    pub fn artifact_path(&self, model_name: &str, version_id: &str) -> PathBuf {
        self.version_dir(model_name, version_id).join(ARTIFACT_FILE)
    }

    /// The cached artifact, if this version was already packaged
    pub async fn cached(&self, model_name: &str, version_id: &str) -> Option<Artifact> {
        let path = self.artifact_path(model_name, version_id);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(Artifact::new(path)),
            _ => None,
        }
    }

    /// Package `source` for a version, or return the cached package
    pub async fn get_or_package(
        &self,
        model_name: &str,
        version_id: &str,
        source: &Path,
    ) -> Result<Artifact> {
        if let Some(artifact) = self.cached(model_name, version_id).await {
            debug!(model = model_name, version = version_id, "Artifact cache hit");
            return Ok(artifact);
        }

        let dir = self.version_dir(model_name, version_id);
        let source = source.to_path_buf();
        let model = model_name.to_string();
        let version = version_id.to_string();

        let artifact = tokio::task::spawn_blocking(move || package(&model, &version, &source, &dir))
            .await
            .map_err(|e| RegistryError::Internal(format!("packaging task failed: {e}")))??;

        info!(
            model = model_name,
            version = version_id,
            path = %artifact.path.display(),
            "Packaged artifact"
        );
        Ok(artifact)
    }
}

/// Find the directory holding the model marker file
pub fn find_model_root(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == MODEL_MARKER)
        .and_then(|entry| entry.path().parent().map(Path::to_path_buf))
}

fn package(model: &str, version: &str, source: &Path, dir: &Path) -> Result<Artifact> {
    if !source.exists() {
        return Err(RegistryError::MissingSource(source.to_path_buf()));
    }
    std::fs::create_dir_all(dir).map_err(|e| RegistryError::io(dir, e))?;

    let out = dir.join(ARTIFACT_FILE);
    // Written under a temporary name so an interrupted run never looks cached.
    let partial = dir.join(format!("{ARTIFACT_FILE}.partial"));

    if source.is_dir() {
        let root = find_model_root(source)
            .ok_or_else(|| RegistryError::MissingModelRoot(source.to_path_buf()))?;
        compress_dir(&root, &partial).map_err(|e| packaging_error(model, version, e))?;
    } else if is_packaged(source) {
        std::fs::copy(source, &partial).map_err(|e| RegistryError::io(source, e))?;
    } else {
        compress_file(source, &partial).map_err(|e| packaging_error(model, version, e))?;
    }

    std::fs::rename(&partial, &out).map_err(|e| RegistryError::io(&out, e))?;
    Ok(Artifact::new(out))
}

fn is_packaged(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

fn compress_dir(root: &Path, out: &Path) -> std::io::Result<()> {
    let file = File::create(out)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all(".", root)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

fn compress_file(source: &Path, out: &Path) -> std::io::Result<()> {
    let name = source
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "source has no file name"))?;
    let file = File::create(out)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_path_with_name(source, name)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

fn packaging_error(model: &str, version: &str, e: std::io::Error) -> RegistryError {
    RegistryError::Packaging {
        model: model.to_string(),
        version: version.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    fn model_dir(base: &Path) -> PathBuf {
        let root = base.join("run").join("artifacts").join("model");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join(MODEL_MARKER), "flavors: {}\n").unwrap();
        std::fs::write(root.join("model.pkl"), b"weights").unwrap();
        root
    }

    fn entries(path: &Path) -> Vec<String> {
        let file = File::open(path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_find_model_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = model_dir(tmp.path());
        assert_eq!(find_model_root(tmp.path()), Some(root));

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(find_model_root(empty.path()), None);
    }

    #[tokio::test]
    async fn test_packages_directory_from_model_root() {
        let src = tempfile::tempdir().unwrap();
        model_dir(src.path());
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(cache_dir.path());

        let artifact = cache.get_or_package("m1", "1", src.path()).await.unwrap();
        assert_eq!(artifact.path, cache.artifact_path("m1", "1"));

        let names = entries(&artifact.path);
        assert!(names.iter().any(|n| n.ends_with(MODEL_MARKER)));
        assert!(names.iter().any(|n| n.ends_with("model.pkl")));
        assert!(!names.iter().any(|n| n.contains("artifacts")));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_source() {
        let src = tempfile::tempdir().unwrap();
        model_dir(src.path());
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(cache_dir.path());

        let first = cache.get_or_package("m1", "1", src.path()).await.unwrap();

        // The source disappearing does not matter once the package exists.
        let gone = src.path().join("does-not-exist");
        let second = cache.get_or_package("m1", "1", &gone).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_directory_without_marker_fails() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("weights.bin"), b"x").unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(cache_dir.path());

        let err = cache.get_or_package("m1", "1", src.path()).await.unwrap_err();
        assert!(matches!(err, RegistryError::MissingModelRoot(_)));
        assert!(cache.cached("m1", "1").await.is_none());
    }

    #[tokio::test]
    async fn test_prepackaged_file_is_copied() {
        let src = tempfile::tempdir().unwrap();
        let tarball = src.path().join("model.tgz");
        std::fs::write(&tarball, b"already packaged").unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(cache_dir.path());

        let artifact = cache.get_or_package("m1", "2", &tarball).await.unwrap();
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"already packaged");
    }

    #[tokio::test]
    async fn test_clear_recreates_root() {
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(cache_dir.path().join("cache"));
        let dir = cache.version_dir("m1", "1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(ARTIFACT_FILE), b"stale").unwrap();

        cache.clear().await.unwrap();
        assert!(cache.root().exists());
        assert!(cache.cached("m1", "1").await.is_none());
    }
}
