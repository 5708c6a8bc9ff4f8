//! In-memory artifact store
//!
//! Reference backend used by tests and single-process deployments. Keeps
//! artifacts in a tokio-guarded map plus a write-order log for `latest`
//! resolution.

use super::{unknown_version, ArtifactStore, ModelArtifact, VersionDescriptor};
use crate::error::{RecError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory, write-once artifact store
#[derive(Default)]
pub struct MemoryArtifactStore {
    inner: RwLock<Inner>,
    /// Simulated outage switch for failure-path tests
    offline: AtomicBool,
}

#[derive(Default)]
struct Inner {
    artifacts: HashMap<String, ModelArtifact>,
    /// Versions in write order; the tail is "latest"
    write_order: Vec<String>,
}

impl MemoryArtifactStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle a simulated backend outage; all operations fail while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RecError::Store("artifact store unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, artifact: ModelArtifact) -> Result<VersionDescriptor> {
        self.check_online()?;
        let version = artifact.descriptor.version.clone();
        let mut inner = self.inner.write().await;

        if inner.artifacts.contains_key(&version) {
            return Err(RecError::VersionConflict { version });
        }

        let descriptor = artifact.descriptor.clone();
        inner.artifacts.insert(version.clone(), artifact);
        inner.write_order.push(version.clone());
        info!(version = %version, "Stored model artifact");

        Ok(descriptor)
    }

    async fn get(&self, version: &str) -> Result<ModelArtifact> {
        self.check_online()?;
        let inner = self.inner.read().await;
        inner
            .artifacts
            .get(version)
            .cloned()
            .ok_or_else(|| unknown_version(version))
    }

    async fn latest(&self) -> Result<ModelArtifact> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let version = inner
            .write_order
            .last()
            .ok_or(RecError::NoModelAvailable)?;
        debug!(version = %version, "Resolved latest artifact");
        Ok(inner.artifacts[version].clone())
    }

    async fn list_versions(&self) -> Result<Vec<VersionDescriptor>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .write_order
            .iter()
            .map(|v| inner.artifacts[v].descriptor.clone())
            .collect())
    }
}
