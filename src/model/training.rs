//! Similarity model training
//!
//! Pairwise cosine similarity over binary purchase rows:
//!
//! ```text
//! sim(a, b) = |purchases(a) ∩ purchases(b)| / (sqrt(|a|) * sqrt(|b|))
//! ```
//!
//! Co-occurrence is accumulated by walking product columns, so user pairs
//! that share no product are never materialized. Scores at or below the
//! retention threshold are discarded; what remains is a per-user neighbor
//! list sorted best-first. Training is fully deterministic: the same
//! snapshot yields byte-identical retained-pair sets.

use super::{ModelMetadata, Neighbor, SimilarityModel};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::matrix::InteractionMatrix;
use std::collections::HashMap;
use tracing::{debug, info};

/// Train a similarity model from an interaction snapshot
///
/// `version` becomes the artifact version identifier once the model is put
/// to the store. The matrix constructor has already rejected empty input,
/// so training itself cannot see an empty snapshot.
pub fn train(
    matrix: &InteractionMatrix,
    config: &EngineConfig,
    version: impl Into<String>,
) -> Result<SimilarityModel> {
    let version = version.into();
    info!(
        version = %version,
        users = matrix.user_count(),
        products = matrix.product_count(),
        nnz = matrix.nnz(),
        "Training similarity model"
    );

    // Co-occurrence counts for user pairs sharing at least one product,
    // keyed (low index, high index)
    let mut co_counts: HashMap<(u32, u32), u32> = HashMap::new();
    for column in matrix.columns() {
        for (i, &a) in column.iter().enumerate() {
            for &b in &column[i + 1..] {
                *co_counts.entry((a, b)).or_insert(0) += 1;
            }
        }
    }
    debug!(candidate_pairs = co_counts.len(), "Accumulated co-occurrence");

    let row_norms: Vec<f64> = matrix
        .rows()
        .iter()
        .map(|row| (row.len() as f64).sqrt())
        .collect();

    let mut neighbors: Vec<Vec<Neighbor>> = vec![Vec::new(); matrix.user_count()];
    let mut retained_pairs = 0usize;

    // Deterministic iteration: sort the candidate pairs before scoring
    let mut pairs: Vec<((u32, u32), u32)> = co_counts.into_iter().collect();
    pairs.sort_unstable_by_key(|(pair, _)| *pair);

    for ((a, b), shared) in pairs {
        let score = shared as f64 / (row_norms[a as usize] * row_norms[b as usize]);
        // Hard exclusive boundary: boundary-equal scores are dropped
        if score > config.similarity_threshold {
            neighbors[a as usize].push(Neighbor { user: b, score });
            neighbors[b as usize].push(Neighbor { user: a, score });
            retained_pairs += 1;
        }
    }

    // Best neighbor first; ties broken by lower user index for determinism
    for list in &mut neighbors {
        list.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| x.user.cmp(&y.user))
        });
    }

    info!(
        version = %version,
        retained_pairs,
        "Similarity training complete"
    );

    Ok(SimilarityModel {
        metadata: ModelMetadata {
            version,
            snapshot_date: chrono::Utc::now(),
            interaction_count: matrix.nnz(),
            retained_pairs,
            similarity_threshold: config.similarity_threshold,
        },
        user_ids: matrix.user_ids().to_vec(),
        product_ids: matrix.product_ids().to_vec(),
        user_index: matrix
            .user_ids()
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as u32))
            .collect(),
        neighbors,
        purchases: matrix.rows().to_vec(),
    })
}
