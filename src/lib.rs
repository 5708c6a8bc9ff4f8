//! # georec
//!
//! Geo-distributed recommendation serving core: collaborative filtering
//! over a sparse user/product interaction matrix, versioned model
//! artifacts, short-TTL result caching, and region health tracking with
//! failover routing.
//!
//! ## Features
//!
//! - **Sparse interaction matrix** built from raw (user, product) events,
//!   with deterministic index assignment
//! - **Thresholded user-user similarity** training (cosine over binary
//!   purchase vectors, strict 0.3 retention boundary)
//! - **Versioned artifact store** behind a capability trait, with
//!   in-memory and filesystem backends and write-once semantics
//! - **In-process model residency** with single-flight reloads and
//!   stale-while-revalidate behavior
//! - **Result cache** keyed by (user, region, count) with lazy TTL expiry
//! - **Region health monitor** with bounded probes and nearest-routable
//!   failover routing
//!
//! ## Usage
//!
//! ```no_run
//! use georec::{
//!     EngineConfig, Interaction, InteractionMatrix, MemoryArtifactStore, ModelCache,
//!     PopularityTable, RecommendationEngine,
//! };
//! use georec::store::{publish_model, ArtifactStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> georec::Result<()> {
//!     let config = EngineConfig::from_env()?;
//!
//!     // Train from an interaction snapshot and publish the artifact
//!     let interactions = vec![
//!         Interaction::new("alice", "p1"),
//!         Interaction::new("alice", "p2"),
//!         Interaction::new("bob", "p1"),
//!         Interaction::new("bob", "p3"),
//!     ];
//!     let matrix = InteractionMatrix::from_interactions(&interactions)?;
//!     let model = georec::model::train(&matrix, &config, "2026-08-27-r1")?;
//!
//!     let store = Arc::new(MemoryArtifactStore::new());
//!     publish_model(store.as_ref(), &model).await?;
//!
//!     // Serve
//!     let model_cache = Arc::new(ModelCache::new(
//!         store as Arc<dyn ArtifactStore>,
//!         config.model_ttl,
//!     ));
//!     let popularity = PopularityTable::new(vec![
//!         ("p1".to_string(), 0.9),
//!         ("p2".to_string(), 0.7),
//!         ("p3".to_string(), 0.5),
//!     ]);
//!     let engine = RecommendationEngine::new(model_cache, popularity, config);
//!
//!     let recommendations = engine.recommend("alice", 10).await?;
//!     for item in recommendations {
//!         println!("{} ({:.3}, {:?})", item.product_id, item.score, item.source);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod matrix;
pub mod model;
pub mod service;
pub mod store;

pub use cache::{CacheStats, CachedResult, ResultCache, ResultCacheBackend, ResultKey};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{
    ProductCatalog, RecommendationEngine, RecommendationHints, ScoreSource, ScoredProduct,
    TrendingProduct,
};
pub use error::{RecError, Result};
pub use health::{RegionMonitor, RegionProbe, RegionReport, RegionStatus};
pub use matrix::{Interaction, InteractionMatrix, PopularityTable};
pub use model::{ModelMetadata, ModelStats, SimilarityModel};
pub use service::{
    aggregate_region_results, AggregationMethod, HealthReport, RecommendationService,
};
pub use store::{
    ArtifactStore, FsArtifactStore, MemoryArtifactStore, ModelArtifact, ModelCache,
    VersionDescriptor,
};

/// Initialize structured logging for binaries and integration harnesses
///
/// Filters via `RUST_LOG`, defaulting to `info`. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
