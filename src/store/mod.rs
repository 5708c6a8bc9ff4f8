//! Versioned model artifact store
//!
//! Trained models are persisted as opaque, immutable artifacts named by
//! version. The store is a capability interface so serving code never knows
//! which backend holds the bytes; tests run against the in-memory variant,
//! production against the filesystem (or any remote object) variant.

pub mod fs;
pub mod memory;
pub mod residency;

use crate::error::{RecError, Result};
use crate::model::SimilarityModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;
pub use residency::ModelCache;

/// Metadata record attached to every stored artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDescriptor {
    /// Version identifier, unique and immutable within a store
    pub version: String,
    /// When the artifact was written
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Snapshot date of the underlying training data
    pub snapshot_date: chrono::DateTime<chrono::Utc>,
    /// Interaction edges in the training snapshot
    pub interaction_count: usize,
    /// Retained similarity pairs in the model
    pub retained_pairs: usize,
}

/// An opaque model blob plus its version metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub descriptor: VersionDescriptor,
    /// Serialized model payload; the store never interprets it
    pub payload: Vec<u8>,
}

impl ModelArtifact {
    /// Serialize a trained model into an artifact
    pub fn from_model(model: &SimilarityModel) -> Result<Self> {
        let payload = serde_json::to_vec(model)?;
        Ok(Self {
            descriptor: VersionDescriptor {
                version: model.metadata.version.clone(),
                created_at: chrono::Utc::now(),
                snapshot_date: model.metadata.snapshot_date,
                interaction_count: model.metadata.interaction_count,
                retained_pairs: model.metadata.retained_pairs,
            },
            payload,
        })
    }

    /// Deserialize the payload back into a model
    ///
    /// A corrupt payload surfaces as a typed serialization error; callers on
    /// the serving path fall back to cold start rather than failing requests.
    pub fn into_model(self) -> Result<SimilarityModel> {
        let model: SimilarityModel = serde_json::from_slice(&self.payload)?;
        Ok(model)
    }
}

/// Capability interface over an artifact backend
///
/// Versions are write-once: `put` of an existing version fails with
/// [`RecError::VersionConflict`]. `latest` resolves to the most recently
/// written version and fails with [`RecError::NoModelAvailable`] on an
/// empty store.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist an artifact under its version id
    async fn put(&self, artifact: ModelArtifact) -> Result<VersionDescriptor>;

    /// Fetch an artifact by exact version id
    async fn get(&self, version: &str) -> Result<ModelArtifact>;

    /// Fetch the most recently written artifact
    async fn latest(&self) -> Result<ModelArtifact>;

    /// All version descriptors, ordered oldest to newest
    async fn list_versions(&self) -> Result<Vec<VersionDescriptor>>;
}

/// Shared "latest wins" ordering used by the backends: write time first,
/// version id as the tiebreak.
pub(crate) fn descriptor_order(a: &VersionDescriptor, b: &VersionDescriptor) -> std::cmp::Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.version.cmp(&b.version))
}

/// Convenience: train-side helper to publish a model
pub async fn publish_model(
    store: &dyn ArtifactStore,
    model: &SimilarityModel,
) -> Result<VersionDescriptor> {
    let artifact = ModelArtifact::from_model(model)?;
    store.put(artifact).await
}

/// Map a missing-version lookup into the store error taxonomy
pub(crate) fn unknown_version(version: &str) -> RecError {
    RecError::Store(format!("unknown artifact version '{}'", version))
}
