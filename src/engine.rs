//! Recommendation engine
//!
//! Turns a user id into a ranked product list. Known users are scored
//! collaboratively from their thresholded neighborhood; unknown users and
//! any model trouble fall back to popularity-ranked cold start. A sparse
//! neighborhood is padded with popularity candidates so the caller always
//! gets `count` items when the catalog allows it.

use crate::config::EngineConfig;
use crate::error::{RecError, Result};
use crate::matrix::PopularityTable;
use crate::model::SimilarityModel;
use crate::store::ModelCache;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a recommended product came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    /// Scored from the user's similarity neighborhood
    Collaborative,
    /// Popularity-ranked cold-start or padding candidate
    Popularity,
}

/// One ranked recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredProduct {
    pub product_id: String,
    pub score: f64,
    pub source: ScoreSource,
}

/// Optional contextual filters supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationHints {
    /// Restrict candidates to one category, when category data is present
    pub category: Option<String>,
}

/// A popularity-ranked product with its normalized trend score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingProduct {
    pub product_id: String,
    pub trend_score: f64,
    pub category: Option<String>,
}

/// Catalog metadata used by hint filtering and trending surfaces
///
/// Optional: an engine without catalog data serves every product and
/// ignores category hints.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    categories: HashMap<String, String>,
}

impl ProductCatalog {
    pub fn new(categories: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
        }
    }

    pub fn category(&self, product_id: &str) -> Option<&str> {
        self.categories.get(product_id).map(|c| c.as_str())
    }

    fn matches(&self, product_id: &str, hints: &RecommendationHints) -> bool {
        match &hints.category {
            Some(wanted) => self
                .category(product_id)
                .map(|c| c == wanted)
                .unwrap_or(false),
            None => true,
        }
    }
}

/// The scoring core
pub struct RecommendationEngine {
    model_cache: Arc<ModelCache>,
    popularity: PopularityTable,
    catalog: ProductCatalog,
    config: EngineConfig,
}

impl RecommendationEngine {
    /// Create an engine over a model cache and the ETL popularity output
    pub fn new(
        model_cache: Arc<ModelCache>,
        popularity: PopularityTable,
        config: EngineConfig,
    ) -> Self {
        Self {
            model_cache,
            popularity,
            catalog: ProductCatalog::default(),
            config,
        }
    }

    /// Attach catalog metadata for hint filtering and trending
    pub fn with_catalog(mut self, catalog: ProductCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Access to the model cache, for health reporting
    pub fn model_cache(&self) -> &ModelCache {
        &self.model_cache
    }

    /// Ranked recommendations for a user
    ///
    /// Deterministic for a fixed model version and popularity table. Never
    /// fails on store trouble; only `count == 0` is an error.
    pub async fn recommend(&self, user_id: &str, count: usize) -> Result<Vec<ScoredProduct>> {
        self.recommend_with_hints(user_id, count, &RecommendationHints::default())
            .await
    }

    /// Ranked recommendations with contextual hints
    pub async fn recommend_with_hints(
        &self,
        user_id: &str,
        count: usize,
        hints: &RecommendationHints,
    ) -> Result<Vec<ScoredProduct>> {
        if count == 0 {
            return Err(RecError::InvalidArgument(
                "count must be a positive integer".to_string(),
            ));
        }
        let count = count.min(self.config.max_recommendations);

        let model = match self.model_cache.current().await {
            Ok(model) => model,
            Err(e) if e.is_transient() || matches!(e, RecError::NoModelAvailable) => {
                // Model load trouble never fails a request
                warn!(user = user_id, error = %e, "Model unavailable, serving cold start");
                return Ok(self.cold_start(count, hints, &HashSet::new()));
            }
            Err(e) => return Err(e),
        };

        let user = match model.user_index(user_id) {
            Some(user) => user,
            None => {
                debug!(user = user_id, "Unknown user, serving cold start");
                return Ok(self.cold_start(count, hints, &HashSet::new()));
            }
        };

        let owned: HashSet<&str> = model
            .purchases(user)
            .iter()
            .filter_map(|p| model.product_id(*p))
            .collect();

        let mut collaborative = self.score_neighborhood(&model, user, &owned, hints);
        collaborative.truncate(count);

        // Pad a sparse neighborhood with popularity candidates; the
        // collaborative block stays first and both blocks keep their order
        if collaborative.len() < count {
            let mut present: HashSet<String> = owned.iter().map(|s| s.to_string()).collect();
            for item in &collaborative {
                present.insert(item.product_id.clone());
            }
            let padding = self.cold_start(count - collaborative.len(), hints, &present);
            collaborative.extend(padding);
        }

        Ok(collaborative)
    }

    /// Score every candidate owned by a top neighbor but not by the target
    fn score_neighborhood(
        &self,
        model: &SimilarityModel,
        user: u32,
        owned: &HashSet<&str>,
        hints: &RecommendationHints,
    ) -> Vec<ScoredProduct> {
        let mut scores: HashMap<&str, f64> = HashMap::new();

        for neighbor in model.neighbors(user).iter().take(self.config.neighbor_cap) {
            for product in model.purchases(neighbor.user) {
                let Some(product_id) = model.product_id(*product) else {
                    continue;
                };
                if owned.contains(product_id) || !self.catalog.matches(product_id, hints) {
                    continue;
                }
                *scores.entry(product_id).or_insert(0.0) +=
                    neighbor.score * self.popularity.score(product_id);
            }
        }

        let mut ranked: Vec<ScoredProduct> = scores
            .into_iter()
            .map(|(product_id, score)| ScoredProduct {
                product_id: product_id.to_string(),
                score,
                source: ScoreSource::Collaborative,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        ranked
    }

    /// Popularity-ranked candidates, skipping `exclude`
    fn cold_start(
        &self,
        count: usize,
        hints: &RecommendationHints,
        exclude: &HashSet<String>,
    ) -> Vec<ScoredProduct> {
        self.popularity
            .top_n(count, |id| {
                exclude.contains(id) || !self.catalog.matches(id, hints)
            })
            .into_iter()
            .map(|(product_id, score)| ScoredProduct {
                product_id: product_id.to_string(),
                score,
                source: ScoreSource::Popularity,
            })
            .collect()
    }

    /// Trending products within the current popularity window
    ///
    /// Scores are normalized against the window's most popular product.
    pub fn trending_products(
        &self,
        count: usize,
        category: Option<&str>,
    ) -> Result<Vec<TrendingProduct>> {
        if count == 0 {
            return Err(RecError::InvalidArgument(
                "count must be a positive integer".to_string(),
            ));
        }

        let max = self.popularity.max_score();
        let hints = RecommendationHints {
            category: category.map(|c| c.to_string()),
        };

        Ok(self
            .popularity
            .top_n(count, |id| !self.catalog.matches(id, &hints))
            .into_iter()
            .map(|(product_id, score)| TrendingProduct {
                product_id: product_id.to_string(),
                trend_score: if max > 0.0 { score / max } else { 0.0 },
                category: self.catalog.category(product_id).map(|c| c.to_string()),
            })
            .collect())
    }
}
