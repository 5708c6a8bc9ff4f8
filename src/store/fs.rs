//! Filesystem artifact store
//!
//! One JSON file per artifact, named `<version>.json` under the store root.
//! Writes go through a temp file and rename so a crashed writer never leaves
//! a half-written artifact visible. "Latest" is derived from the descriptor
//! metadata of the listed files, not from filename ordering, so version ids
//! carry no lexicographic meaning.

use super::{descriptor_order, unknown_version, ArtifactStore, ModelArtifact, VersionDescriptor};
use crate::error::{RecError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Write-once artifact store rooted at a directory
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!(root = %root.display(), "Opened filesystem artifact store");
        Ok(Self { root })
    }

    fn artifact_path(&self, version: &str) -> Result<PathBuf> {
        // Version ids become filenames; keep them path-safe
        if version.is_empty()
            || !version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(RecError::InvalidArgument(format!(
                "version id '{}' is not a valid artifact name",
                version
            )));
        }
        Ok(self.root.join(format!("{}.json", version)))
    }

    fn read_artifact(&self, path: &Path) -> Result<ModelArtifact> {
        let bytes = std::fs::read(path)?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        Ok(artifact)
    }

    fn scan_descriptors(&self) -> Result<Vec<VersionDescriptor>> {
        let mut descriptors = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_artifact(&path) {
                Ok(artifact) => descriptors.push(artifact.descriptor),
                Err(e) => {
                    // A corrupt file must not take down listing; it is
                    // skipped and surfaced in the logs
                    warn!(path = %path.display(), error = %e, "Skipping unreadable artifact");
                }
            }
        }
        descriptors.sort_by(descriptor_order);
        Ok(descriptors)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, artifact: ModelArtifact) -> Result<VersionDescriptor> {
        let version = artifact.descriptor.version.clone();
        let path = self.artifact_path(&version)?;

        if path.exists() {
            return Err(RecError::VersionConflict { version });
        }

        let bytes = serde_json::to_vec(&artifact)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &path)?;

        info!(version = %version, path = %path.display(), "Stored model artifact");
        Ok(artifact.descriptor)
    }

    async fn get(&self, version: &str) -> Result<ModelArtifact> {
        let path = self.artifact_path(version)?;
        if !path.exists() {
            return Err(unknown_version(version));
        }
        self.read_artifact(&path)
    }

    async fn latest(&self) -> Result<ModelArtifact> {
        let descriptors = self.scan_descriptors()?;
        let newest = descriptors.last().ok_or(RecError::NoModelAvailable)?;
        debug!(version = %newest.version, "Resolved latest artifact");
        self.get(&newest.version).await
    }

    async fn list_versions(&self) -> Result<Vec<VersionDescriptor>> {
        self.scan_descriptors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::matrix::{Interaction, InteractionMatrix};
    use crate::model::train;

    fn artifact(version: &str) -> ModelArtifact {
        let interactions = vec![Interaction::new("a", "1"), Interaction::new("b", "1")];
        let matrix = InteractionMatrix::from_interactions(&interactions).unwrap();
        let model = train(&matrix, &EngineConfig::default(), version).unwrap();
        ModelArtifact::from_model(&model).unwrap()
    }

    #[tokio::test]
    async fn test_fs_put_get_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();

        store.put(artifact("v1")).await.unwrap();
        store.put(artifact("v2")).await.unwrap();

        let fetched = store.get("v1").await.unwrap();
        assert_eq!(fetched.descriptor.version, "v1");
        assert_eq!(store.latest().await.unwrap().descriptor.version, "v2");
    }

    #[tokio::test]
    async fn test_fs_version_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();

        store.put(artifact("v1")).await.unwrap();
        assert!(matches!(
            store.put(artifact("v1")).await,
            Err(RecError::VersionConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_fs_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();

        assert!(matches!(
            store.latest().await,
            Err(RecError::NoModelAvailable)
        ));
    }

    #[tokio::test]
    async fn test_fs_rejects_unsafe_version_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();

        assert!(matches!(
            store.get("../escape").await,
            Err(RecError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.get("").await,
            Err(RecError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_fs_corrupt_artifact_skipped_in_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();

        store.put(artifact("v1")).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), b"not json").unwrap();

        let versions = store.list_versions().await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, "v1");
        // Latest still resolves past the corrupt file
        assert_eq!(store.latest().await.unwrap().descriptor.version, "v1");
    }

    #[tokio::test]
    async fn test_fs_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FsArtifactStore::new(dir.path()).unwrap();
            store.put(artifact("v1")).await.unwrap();
        }

        let reopened = FsArtifactStore::new(dir.path()).unwrap();
        assert_eq!(reopened.latest().await.unwrap().descriptor.version, "v1");
    }
}
