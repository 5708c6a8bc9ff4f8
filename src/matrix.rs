//! Sparse user-product interaction matrix
//!
//! The matrix is the training input for the similarity model: a binary
//! user x product structure stored as sorted index lists per row and per
//! column. Memory is proportional to the number of interaction edges, never
//! to users x products; the catalog is near-maximally sparse in production.

use crate::error::{RecError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// A single deduplicated interaction edge from the ETL output
///
/// The timestamp is carried for temporal train/test partitioning upstream;
/// the runtime matrix keeps only the (user, product) edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: String,
    pub product_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Interaction {
    pub fn new(user_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            product_id: product_id.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Sparse boolean user x product matrix with bidirectional id mappings
///
/// Rows (products per user) and columns (users per product) are both kept
/// as sorted integer index lists, so slicing either axis costs the number
/// of nonzeros on that axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionMatrix {
    user_ids: Vec<String>,
    product_ids: Vec<String>,
    user_index: HashMap<String, u32>,
    product_index: HashMap<String, u32>,
    /// Sorted product indices per user
    rows: Vec<Vec<u32>>,
    /// Sorted user indices per product
    columns: Vec<Vec<u32>>,
    /// Number of distinct (user, product) edges
    nnz: usize,
}

impl InteractionMatrix {
    /// Build the matrix from a finalized interaction set
    ///
    /// Duplicate (user, product) pairs collapse to a single edge. Index
    /// positions are assigned in sorted-id order so the same snapshot always
    /// produces the same matrix. Fails with [`RecError::EmptyTrainingSet`]
    /// when no interactions are supplied.
    pub fn from_interactions(interactions: &[Interaction]) -> Result<Self> {
        if interactions.is_empty() {
            return Err(RecError::EmptyTrainingSet);
        }

        // Dedup by (user, product); BTreeSet gives deterministic iteration
        let edges: BTreeSet<(&str, &str)> = interactions
            .iter()
            .map(|i| (i.user_id.as_str(), i.product_id.as_str()))
            .collect();

        // Indices are assigned in sorted-id order so a snapshot always maps
        // to the same positions regardless of input order
        let users: BTreeSet<&str> = edges.iter().map(|(u, _)| *u).collect();
        let products: BTreeSet<&str> = edges.iter().map(|(_, p)| *p).collect();
        let user_map: BTreeMap<&str, u32> = users
            .iter()
            .enumerate()
            .map(|(i, k)| (*k, i as u32))
            .collect();
        let product_map: BTreeMap<&str, u32> = products
            .iter()
            .enumerate()
            .map(|(i, k)| (*k, i as u32))
            .collect();

        let mut rows: Vec<Vec<u32>> = vec![Vec::new(); user_map.len()];
        let mut columns: Vec<Vec<u32>> = vec![Vec::new(); product_map.len()];

        for (user, product) in &edges {
            let u = user_map[user];
            let p = product_map[product];
            rows[u as usize].push(p);
            columns[p as usize].push(u);
        }
        for row in &mut rows {
            row.sort_unstable();
        }
        for col in &mut columns {
            col.sort_unstable();
        }

        let user_ids: Vec<String> = user_map.keys().map(|k| k.to_string()).collect();
        let product_ids: Vec<String> = product_map.keys().map(|k| k.to_string()).collect();
        let user_index: HashMap<String, u32> = user_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as u32))
            .collect();
        let product_index: HashMap<String, u32> = product_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as u32))
            .collect();

        let nnz = edges.len();
        info!(
            users = user_ids.len(),
            products = product_ids.len(),
            nnz,
            "Built interaction matrix"
        );

        Ok(Self {
            user_ids,
            product_ids,
            user_index,
            product_index,
            rows,
            columns,
            nnz,
        })
    }

    /// Number of distinct users
    pub fn user_count(&self) -> usize {
        self.user_ids.len()
    }

    /// Number of distinct products
    pub fn product_count(&self) -> usize {
        self.product_ids.len()
    }

    /// Number of stored interaction edges
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Fraction of the full user x product space that is populated
    pub fn density(&self) -> f64 {
        let cells = self.user_count() * self.product_count();
        if cells == 0 {
            0.0
        } else {
            self.nnz as f64 / cells as f64
        }
    }

    /// Resolve a user id to its stable index
    pub fn user_index(&self, user_id: &str) -> Option<u32> {
        self.user_index.get(user_id).copied()
    }

    /// Resolve a product id to its stable index
    pub fn product_index(&self, product_id: &str) -> Option<u32> {
        self.product_index.get(product_id).copied()
    }

    /// Look up the user id at an index
    pub fn user_id(&self, index: u32) -> Option<&str> {
        self.user_ids.get(index as usize).map(|s| s.as_str())
    }

    /// Look up the product id at an index
    pub fn product_id(&self, index: u32) -> Option<&str> {
        self.product_ids.get(index as usize).map(|s| s.as_str())
    }

    /// Sorted product indices purchased by a user; O(row nonzeros)
    pub fn user_row(&self, user: u32) -> &[u32] {
        self.rows
            .get(user as usize)
            .map(|r| r.as_slice())
            .unwrap_or(&[])
    }

    /// Sorted user indices that purchased a product; O(column nonzeros)
    pub fn product_column(&self, product: u32) -> &[u32] {
        self.columns
            .get(product as usize)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// All rows, indexed by user position
    pub(crate) fn rows(&self) -> &[Vec<u32>] {
        &self.rows
    }

    /// All columns, indexed by product position
    pub(crate) fn columns(&self) -> &[Vec<u32>] {
        &self.columns
    }

    /// Owned copy of the product id table, used when snapshotting a model
    pub(crate) fn product_ids(&self) -> &[String] {
        &self.product_ids
    }

    /// Owned copy of the user id table
    pub(crate) fn user_ids(&self) -> &[String] {
        &self.user_ids
    }
}

/// Time-windowed product popularity, consumed from the ETL output
///
/// Scores are relative weights within the current window; the table is
/// recomputed periodically upstream, never per request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopularityTable {
    scores: HashMap<String, f64>,
}

impl PopularityTable {
    /// Build from (product id, score) pairs; later duplicates win
    pub fn new(entries: impl IntoIterator<Item = (String, f64)>) -> Self {
        let scores: HashMap<String, f64> = entries.into_iter().collect();
        debug!(products = scores.len(), "Loaded popularity table");
        Self { scores }
    }

    /// Popularity score for a product, 0.0 when unknown
    pub fn score(&self, product_id: &str) -> f64 {
        self.scores.get(product_id).copied().unwrap_or(0.0)
    }

    /// Number of scored products
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Highest score in the table, used for trend normalization
    pub fn max_score(&self) -> f64 {
        self.scores.values().fold(0.0_f64, |acc, s| acc.max(*s))
    }

    /// Top `count` products by score, skipping any id in `exclude`
    ///
    /// Deterministic ordering: score descending, product id ascending on
    /// ties.
    pub fn top_n<'a>(
        &'a self,
        count: usize,
        exclude: impl Fn(&str) -> bool,
    ) -> Vec<(&'a str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .scores
            .iter()
            .filter(|(id, _)| !exclude(id))
            .map(|(id, score)| (id.as_str(), *score))
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.truncate(count);
        ranked
    }
}
