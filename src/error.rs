//! Error types for the recommendation core
//!
//! This module defines the crate-wide error taxonomy. Training-time errors
//! (`EmptyTrainingSet`, `VersionConflict`) are fatal to the job that hits
//! them but never surface from the serving path; transient store and cache
//! errors are absorbed by fallbacks in the engine and service layers.

use thiserror::Error;

/// Main error type for recommendation operations
#[derive(Error, Debug)]
pub enum RecError {
    /// Training was attempted on an empty interaction set
    #[error("Training set is empty: at least one (user, product) interaction is required")]
    EmptyTrainingSet,

    /// An artifact version was written twice
    #[error("Version conflict: artifact version '{version}' already exists and is immutable")]
    VersionConflict { version: String },

    /// No trained model artifact exists yet
    #[error("No model available: the artifact store holds no versions")]
    NoModelAvailable,

    /// Caller-correctable argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No region is healthy or degraded
    #[error("No region available: all configured regions are unhealthy")]
    NoRegionAvailable,

    /// Transient artifact store error (unreachable backend, corrupt artifact)
    #[error("Artifact store error: {0}")]
    Store(String),

    /// Transient result cache backend error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error from the on-disk artifact backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for recommendation operations
pub type Result<T> = std::result::Result<T, RecError>;

impl RecError {
    /// Whether this error is absorbed by a serving-path fallback rather
    /// than surfaced to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RecError::Store(_) | RecError::Cache(_) | RecError::Io(_) | RecError::Serialization(_)
        )
    }
}

impl From<String> for RecError {
    fn from(s: String) -> Self {
        RecError::Store(s)
    }
}

impl From<&str> for RecError {
    fn from(s: &str) -> Self {
        RecError::Store(s.to_string())
    }
}
