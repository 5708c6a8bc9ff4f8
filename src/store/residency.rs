//! In-process model residency cache
//!
//! One shared slot per process holds the currently installed model version.
//! Reads are lock-free in spirit (a short RwLock read and an Arc clone);
//! reloads after the residency window are single-flight: the caller that
//! wins the reload mutex fetches "latest" from the artifact store and swaps
//! the slot, while every concurrent caller keeps serving the still-present
//! copy, stale or not. Serving stale during reload is deliberate; the slot
//! converges to the new version within one window.

use super::ArtifactStore;
use crate::error::{RecError, Result};
use crate::model::SimilarityModel;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// The installed model plus its load instant
struct Installed {
    model: Arc<SimilarityModel>,
    loaded_at: Instant,
}

/// Residency-cached view over an artifact store
pub struct ModelCache {
    store: Arc<dyn ArtifactStore>,
    ttl: Duration,
    slot: RwLock<Option<Installed>>,
    /// Single-flight guard: at most one reload in flight
    reload: Mutex<()>,
    /// Whether the last store access succeeded, for health reporting
    store_reachable: std::sync::atomic::AtomicBool,
}

impl ModelCache {
    /// Create a cache over `store` with the given residency window
    pub fn new(store: Arc<dyn ArtifactStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            slot: RwLock::new(None),
            reload: Mutex::new(()),
            store_reachable: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Currently installed model, reloading from the store when the
    /// residency window has elapsed
    ///
    /// Error cases:
    /// - empty slot and empty store: [`RecError::NoModelAvailable`]
    /// - empty slot and unreachable store: the store's typed error
    /// - stale slot and failed reload: the stale copy is served with a
    ///   warning, never an error
    pub async fn current(&self) -> Result<Arc<SimilarityModel>> {
        // Fast path: fresh copy installed
        {
            let slot = self.slot.read().await;
            if let Some(installed) = slot.as_ref() {
                if installed.loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&installed.model));
                }
            }
        }

        // Slot is empty or stale. Only one caller reloads at a time.
        match self.reload.try_lock() {
            Ok(_guard) => self.reload_slot().await,
            Err(_) => {
                // A reload is already in flight; serve whatever is present
                let slot = self.slot.read().await;
                match slot.as_ref() {
                    Some(installed) => {
                        debug!("Reload in flight, serving resident model copy");
                        Ok(Arc::clone(&installed.model))
                    }
                    None => {
                        // First load racing: wait for the reloader to finish
                        drop(slot);
                        let _guard = self.reload.lock().await;
                        let slot = self.slot.read().await;
                        slot.as_ref()
                            .map(|i| Arc::clone(&i.model))
                            .ok_or(RecError::NoModelAvailable)
                    }
                }
            }
        }
    }

    /// Fetch "latest" and swap it into the slot; on failure fall back to a
    /// stale copy when one exists
    async fn reload_slot(&self) -> Result<Arc<SimilarityModel>> {
        // Re-check freshness under the reload guard; another caller may
        // have completed the swap while we waited for the fast path
        {
            let slot = self.slot.read().await;
            if let Some(installed) = slot.as_ref() {
                if installed.loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&installed.model));
                }
            }
        }

        match self.load_latest().await {
            Ok(model) => {
                let model = Arc::new(model);
                let mut slot = self.slot.write().await;
                info!(version = %model.metadata.version, "Installed model version");
                *slot = Some(Installed {
                    model: Arc::clone(&model),
                    loaded_at: Instant::now(),
                });
                Ok(model)
            }
            Err(e) => {
                let slot = self.slot.read().await;
                match slot.as_ref() {
                    Some(installed) => {
                        warn!(error = %e, "Model reload failed, serving stale copy");
                        Ok(Arc::clone(&installed.model))
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn load_latest(&self) -> Result<SimilarityModel> {
        use std::sync::atomic::Ordering;
        match self.store.latest().await {
            Ok(artifact) => {
                self.store_reachable.store(true, Ordering::SeqCst);
                artifact.into_model()
            }
            Err(e @ RecError::NoModelAvailable) => {
                // The store answered; it just has nothing yet
                self.store_reachable.store(true, Ordering::SeqCst);
                Err(e)
            }
            Err(e) => {
                self.store_reachable.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Version of the installed model, if any
    pub async fn installed_version(&self) -> Option<String> {
        let slot = self.slot.read().await;
        slot.as_ref().map(|i| i.model.metadata.version.clone())
    }

    /// Whether the last store access succeeded
    pub fn store_reachable(&self) -> bool {
        self.store_reachable
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Drop the installed copy so the next request reloads
    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
        debug!("Model residency slot invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::matrix::{Interaction, InteractionMatrix};
    use crate::model::train;
    use crate::store::{publish_model, MemoryArtifactStore};

    fn sample_model(version: &str) -> SimilarityModel {
        let interactions = vec![Interaction::new("a", "1"), Interaction::new("b", "1")];
        let matrix = InteractionMatrix::from_interactions(&interactions).unwrap();
        train(&matrix, &EngineConfig::default(), version).unwrap()
    }

    #[tokio::test]
    async fn test_first_load_installs_latest() {
        let store = Arc::new(MemoryArtifactStore::new());
        publish_model(store.as_ref(), &sample_model("v1"))
            .await
            .unwrap();

        let cache = ModelCache::new(store, Duration::from_secs(3600));
        let model = cache.current().await.unwrap();
        assert_eq!(model.metadata.version, "v1");
        assert_eq!(cache.installed_version().await, Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_empty_store_surfaces_no_model() {
        let store = Arc::new(MemoryArtifactStore::new());
        let cache = ModelCache::new(store, Duration::from_secs(3600));

        assert!(matches!(
            cache.current().await,
            Err(RecError::NoModelAvailable)
        ));
        // Store answered, so it counts as reachable
        assert!(cache.store_reachable());
    }

    #[tokio::test]
    async fn test_fresh_slot_skips_store() {
        let store = Arc::new(MemoryArtifactStore::new());
        publish_model(store.as_ref(), &sample_model("v1"))
            .await
            .unwrap();

        let cache = ModelCache::new(Arc::clone(&store) as Arc<dyn ArtifactStore>, Duration::from_secs(3600));
        cache.current().await.unwrap();

        // New version exists but the resident copy is still fresh
        publish_model(store.as_ref(), &sample_model("v2"))
            .await
            .unwrap();
        let model = cache.current().await.unwrap();
        assert_eq!(model.metadata.version, "v1");
    }

    #[tokio::test]
    async fn test_expired_slot_reloads_latest() {
        let store = Arc::new(MemoryArtifactStore::new());
        publish_model(store.as_ref(), &sample_model("v1"))
            .await
            .unwrap();

        let cache = ModelCache::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Duration::from_millis(20),
        );
        cache.current().await.unwrap();

        publish_model(store.as_ref(), &sample_model("v2"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let model = cache.current().await.unwrap();
        assert_eq!(model.metadata.version, "v2");
    }

    #[tokio::test]
    async fn test_failed_reload_serves_stale() {
        let store = Arc::new(MemoryArtifactStore::new());
        publish_model(store.as_ref(), &sample_model("v1"))
            .await
            .unwrap();

        let cache = ModelCache::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Duration::from_millis(20),
        );
        cache.current().await.unwrap();

        store.set_offline(true);
        tokio::time::sleep(Duration::from_millis(40)).await;

        // Reload fails, stale copy is served and reachability is recorded
        let model = cache.current().await.unwrap();
        assert_eq!(model.metadata.version, "v1");
        assert!(!cache.store_reachable());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let store = Arc::new(MemoryArtifactStore::new());
        publish_model(store.as_ref(), &sample_model("v1"))
            .await
            .unwrap();

        let cache = ModelCache::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Duration::from_secs(3600),
        );
        cache.current().await.unwrap();

        publish_model(store.as_ref(), &sample_model("v2"))
            .await
            .unwrap();
        cache.invalidate().await;

        let model = cache.current().await.unwrap();
        assert_eq!(model.metadata.version, "v2");
    }

    #[tokio::test]
    async fn test_concurrent_readers_share_one_copy() {
        let store = Arc::new(MemoryArtifactStore::new());
        publish_model(store.as_ref(), &sample_model("v1"))
            .await
            .unwrap();

        let cache = Arc::new(ModelCache::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Duration::from_secs(3600),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.current().await.unwrap().metadata.version.clone()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "v1");
        }
    }
}
