//! Region-aware serving facade
//!
//! Ties the engine, the result cache, and the region monitor together into
//! the surface a request handler would call. Requests read through the
//! result cache; cache trouble degrades to a direct engine computation and
//! never fails the request. The health report is the single snapshot a
//! load balancer polls.

use crate::cache::{CachedResult, ResultCacheBackend, ResultKey};
use crate::config::EngineConfig;
use crate::engine::{RecommendationEngine, RecommendationHints, ScoredProduct};
use crate::error::Result;
use crate::health::{RegionMonitor, RegionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// How ranked lists from several regions are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Sum scores for products appearing in more than one region
    Merge,
    /// Keep each product's single best regional score
    HighestScore,
}

/// Snapshot of one serving process, for load balancers and dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub region: String,
    pub status: RegionStatus,
    pub latency_estimate_ms: Option<u64>,
    pub cache_hit_ratio: f64,
    pub model_version: Option<String>,
    pub store_reachable: bool,
}

/// The request-facing recommendation service
pub struct RecommendationService {
    engine: Arc<RecommendationEngine>,
    cache: Arc<dyn ResultCacheBackend>,
    monitor: Arc<RegionMonitor>,
    config: EngineConfig,
}

impl RecommendationService {
    pub fn new(
        engine: Arc<RecommendationEngine>,
        cache: Arc<dyn ResultCacheBackend>,
        monitor: Arc<RegionMonitor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            monitor,
            config,
        }
    }

    /// Ranked recommendations for a user, read through the result cache
    ///
    /// The cache key includes this process's region and the requested
    /// count. A failing cache backend is logged and bypassed.
    pub async fn recommend(&self, user_id: &str, count: usize) -> Result<Vec<ScoredProduct>> {
        self.recommend_for_region(user_id, count, &self.config.region)
            .await
    }

    /// Same as [`recommend`](Self::recommend) but cached under an explicit
    /// region tag, for fan-out callers serving on behalf of another region
    pub async fn recommend_for_region(
        &self,
        user_id: &str,
        count: usize,
        region: &str,
    ) -> Result<Vec<ScoredProduct>> {
        self.recommend_cached(user_id, count, region).await
    }

    /// Ranked recommendations with contextual hints
    ///
    /// Hinted requests skip the cache: the key does not carry hints, and a
    /// hinted list must never be served to an unhinted caller.
    pub async fn recommend_with_hints(
        &self,
        user_id: &str,
        count: usize,
        hints: &RecommendationHints,
    ) -> Result<Vec<ScoredProduct>> {
        if hints.category.is_some() {
            return self.engine.recommend_with_hints(user_id, count, hints).await;
        }
        self.recommend_cached(user_id, count, &self.config.region)
            .await
    }

    async fn recommend_cached(
        &self,
        user_id: &str,
        count: usize,
        region: &str,
    ) -> Result<Vec<ScoredProduct>> {
        let key = ResultKey::new(user_id, region, count);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                debug!(key = %key, "Serving cached recommendations");
                return Ok(cached.products);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Result cache read failed, computing directly");
            }
        }

        let products = self.engine.recommend(user_id, count).await?;

        let entry = CachedResult::with_ttl(products.clone(), self.config.result_ttl_with_jitter());
        if let Err(e) = self.cache.put(key.clone(), entry).await {
            // Losing the write only costs a later recomputation
            warn!(key = %key, error = %e, "Result cache write failed");
        }

        Ok(products)
    }

    /// Region this request should be routed to, nearest healthy first
    pub async fn route(&self) -> Result<String> {
        self.monitor.route().await
    }

    /// Point-in-time health of this serving process
    pub async fn health(&self) -> HealthReport {
        let reports = self.monitor.report().await;
        let own = reports.iter().find(|r| r.region == self.config.region);

        let model_cache = self.engine.model_cache();
        let stats = self.cache.stats().await;

        HealthReport {
            region: self.config.region.clone(),
            status: own.map(|r| r.status).unwrap_or(RegionStatus::Healthy),
            latency_estimate_ms: own.and_then(|r| r.last_latency_ms),
            cache_hit_ratio: stats.hit_rate(),
            model_version: model_cache.installed_version().await,
            store_reachable: model_cache.store_reachable(),
        }
    }

    /// Access to the underlying engine
    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }
}

/// Combine per-region ranked lists into one list of at most `count` items
///
/// `Merge` sums a product's scores across regions; `HighestScore` keeps its
/// single best score. Ordering is score descending with product id as the
/// tiebreak, so aggregation is deterministic regardless of region order.
pub fn aggregate_region_results(
    regional: &[(String, Vec<ScoredProduct>)],
    method: AggregationMethod,
    count: usize,
) -> Vec<ScoredProduct> {
    let mut combined: HashMap<&str, ScoredProduct> = HashMap::new();

    for (region, products) in regional {
        debug!(region = %region, items = products.len(), "Aggregating regional results");
        for product in products {
            combined
                .entry(product.product_id.as_str())
                .and_modify(|existing| match method {
                    AggregationMethod::Merge => existing.score += product.score,
                    AggregationMethod::HighestScore => {
                        if product.score > existing.score {
                            existing.score = product.score;
                            existing.source = product.source;
                        }
                    }
                })
                .or_insert_with(|| product.clone());
        }
    }

    let mut ranked: Vec<ScoredProduct> = combined.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    ranked.truncate(count);
    ranked
}
