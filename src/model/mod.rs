//! Versioned similarity model
//!
//! A trained model is an immutable snapshot: the user-index mapping, the
//! thresholded neighbor lists, the purchase rows it was trained on, and
//! training metadata. Models are written once to the artifact store and are
//! read-only until superseded by a newer version.

pub mod training;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use training::train;

/// One retained similarity edge in a user's neighbor list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Index of the neighboring user
    pub user: u32,
    /// Cosine similarity, strictly above the retention threshold
    pub score: f64,
}

/// Training metadata attached to every model version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Artifact version identifier
    pub version: String,
    /// When the interaction snapshot was taken
    pub snapshot_date: chrono::DateTime<chrono::Utc>,
    /// Number of interaction edges in the snapshot
    pub interaction_count: usize,
    /// Number of retained similarity entries (both directions counted once)
    pub retained_pairs: usize,
    /// Retention threshold the model was trained with
    pub similarity_threshold: f64,
}

/// Aggregate model statistics for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub version: String,
    pub user_count: usize,
    pub product_count: usize,
    pub interaction_count: usize,
    pub matrix_density: f64,
    pub retained_pairs: usize,
}

/// A trained, immutable similarity model
///
/// Neighbor lists are sorted by descending similarity with ties broken by
/// lower user index, so query-time top-K selection is a prefix take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityModel {
    pub metadata: ModelMetadata,
    user_ids: Vec<String>,
    product_ids: Vec<String>,
    user_index: HashMap<String, u32>,
    /// Thresholded neighbor list per user, sorted (score desc, index asc)
    neighbors: Vec<Vec<Neighbor>>,
    /// Sorted product indices purchased by each user in the snapshot
    purchases: Vec<Vec<u32>>,
}

impl SimilarityModel {
    /// Resolve a user id to its index in this model's snapshot
    pub fn user_index(&self, user_id: &str) -> Option<u32> {
        self.user_index.get(user_id).copied()
    }

    /// Product id at a snapshot index
    pub fn product_id(&self, index: u32) -> Option<&str> {
        self.product_ids.get(index as usize).map(|s| s.as_str())
    }

    /// User id at a snapshot index
    pub fn user_id(&self, index: u32) -> Option<&str> {
        self.user_ids.get(index as usize).map(|s| s.as_str())
    }

    /// Thresholded neighbor list for a user, best first
    pub fn neighbors(&self, user: u32) -> &[Neighbor] {
        self.neighbors
            .get(user as usize)
            .map(|n| n.as_slice())
            .unwrap_or(&[])
    }

    /// Sorted product indices the user had purchased at snapshot time
    pub fn purchases(&self, user: u32) -> &[u32] {
        self.purchases
            .get(user as usize)
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    /// Retained similarity between two users, if above threshold
    pub fn similarity(&self, a: u32, b: u32) -> Option<f64> {
        self.neighbors(a)
            .iter()
            .find(|n| n.user == b)
            .map(|n| n.score)
    }

    /// Number of users in the snapshot
    pub fn user_count(&self) -> usize {
        self.user_ids.len()
    }

    /// Number of products in the snapshot
    pub fn product_count(&self) -> usize {
        self.product_ids.len()
    }

    /// Diagnostics summary for health and dashboard surfaces
    pub fn stats(&self) -> ModelStats {
        let cells = self.user_count() * self.product_count();
        let density = if cells == 0 {
            0.0
        } else {
            self.metadata.interaction_count as f64 / cells as f64
        };

        ModelStats {
            version: self.metadata.version.clone(),
            user_count: self.user_count(),
            product_count: self.product_count(),
            interaction_count: self.metadata.interaction_count,
            matrix_density: density,
            retained_pairs: self.metadata.retained_pairs,
        }
    }
}
