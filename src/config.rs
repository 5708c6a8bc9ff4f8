//! Configuration for the recommendation core
//!
//! All tunables live in one immutable structure that is passed into each
//! component at construction. Nothing in the serving path reads ad hoc
//! globals; operators change behavior by building a different config.

use crate::error::{RecError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the recommendation engine and its caches
///
/// Defaults reproduce the production tuning:
/// - similarity retention strictly above 0.3
/// - 50-neighbor query-time cap
/// - 1 hour model residency, 300 s result TTL
/// - 10 s probe interval, 3 consecutive failures to mark a region down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Region this process serves (part of every result cache key)
    pub region: String,

    /// Hard inclusion boundary for retained similarities; entries with a
    /// score less than or equal to this value are discarded at training time
    pub similarity_threshold: f64,

    /// Number of top neighbors consulted per request
    pub neighbor_cap: usize,

    /// Residency window for the in-process model slot before a reload from
    /// the artifact store is triggered
    pub model_ttl: Duration,

    /// Time-to-live for cached recommendation lists
    pub result_ttl: Duration,

    /// Result TTL jitter factor (0.0 - 1.0), spread out to prevent
    /// synchronized expiry under load; 0.0 keeps the TTL exact
    pub result_ttl_jitter: f64,

    /// Interval between health probes of each region
    pub probe_interval: Duration,

    /// Upper bound on a single probe; exceeding it counts as a failure
    pub probe_timeout: Duration,

    /// Consecutive failed probes before a region is marked unhealthy
    pub failure_threshold: u32,

    /// Default number of recommendations when the caller does not specify
    pub default_recommendations: usize,

    /// Upper bound on the requested recommendation count
    pub max_recommendations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            similarity_threshold: 0.3,
            neighbor_cap: 50,
            // 1 hour model residency
            model_ttl: Duration::from_secs(3600),
            // 5 minute result TTL
            result_ttl: Duration::from_secs(300),
            result_ttl_jitter: 0.0,
            probe_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            default_recommendations: 10,
            max_recommendations: 50,
        }
    }
}

impl EngineConfig {
    /// Create a new builder for engine configuration
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Production preset: the default tuning
    pub fn production() -> Self {
        Self::default()
    }

    /// Development preset: short residency windows and fast probes so local
    /// iteration sees changes without waiting out production TTLs
    pub fn development() -> Self {
        Self {
            model_ttl: Duration::from_secs(60),
            result_ttl: Duration::from_secs(10),
            probe_interval: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(RecError::Config("region must not be empty".to_string()));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RecError::Config(
                "similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.neighbor_cap == 0 {
            return Err(RecError::Config(
                "neighbor_cap must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.result_ttl_jitter) {
            return Err(RecError::Config(
                "result_ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.failure_threshold == 0 {
            return Err(RecError::Config(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.max_recommendations == 0 || self.default_recommendations > self.max_recommendations
        {
            return Err(RecError::Config(
                "max_recommendations must be >= default_recommendations and > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Result TTL with jitter applied
    pub fn result_ttl_with_jitter(&self) -> Duration {
        if self.result_ttl_jitter == 0.0 {
            return self.result_ttl;
        }

        let base_secs = self.result_ttl.as_secs_f64();
        let jitter_range = base_secs * self.result_ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::from_secs_f64(final_secs)
    }

    /// Load configuration from the environment, falling back to defaults
    ///
    /// Reads a `.env` file when present, then `GEOREC_*` variables:
    /// `GEOREC_REGION`, `GEOREC_SIMILARITY_THRESHOLD`, `GEOREC_NEIGHBOR_CAP`,
    /// `GEOREC_MODEL_TTL_SECS`, `GEOREC_RESULT_TTL_SECS`,
    /// `GEOREC_PROBE_INTERVAL_SECS`, `GEOREC_FAILURE_THRESHOLD`.
    pub fn from_env() -> Result<Self> {
        // Missing .env file is fine; env vars may come from the process
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Ok(region) = std::env::var("GEOREC_REGION") {
            config.region = region;
        }
        if let Some(v) = parse_env_f64("GEOREC_SIMILARITY_THRESHOLD")? {
            config.similarity_threshold = v;
        }
        if let Some(v) = parse_env_u64("GEOREC_NEIGHBOR_CAP")? {
            config.neighbor_cap = v as usize;
        }
        if let Some(v) = parse_env_u64("GEOREC_MODEL_TTL_SECS")? {
            config.model_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parse_env_u64("GEOREC_RESULT_TTL_SECS")? {
            config.result_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parse_env_u64("GEOREC_PROBE_INTERVAL_SECS")? {
            config.probe_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_env_u64("GEOREC_FAILURE_THRESHOLD")? {
            config.failure_threshold = v as u32;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| RecError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

fn parse_env_f64(name: &str) -> Result<Option<f64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|e| RecError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

/// Builder for engine configuration
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    region: Option<String>,
    similarity_threshold: Option<f64>,
    neighbor_cap: Option<usize>,
    model_ttl: Option<Duration>,
    result_ttl: Option<Duration>,
    result_ttl_jitter: Option<f64>,
    probe_interval: Option<Duration>,
    probe_timeout: Option<Duration>,
    failure_threshold: Option<u32>,
    default_recommendations: Option<usize>,
    max_recommendations: Option<usize>,
}

impl EngineConfigBuilder {
    /// Set the serving region tag
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the similarity retention boundary
    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// Set the query-time neighbor cap
    pub fn neighbor_cap(mut self, cap: usize) -> Self {
        self.neighbor_cap = Some(cap);
        self
    }

    /// Set the model residency window
    pub fn model_ttl(mut self, ttl: Duration) -> Self {
        self.model_ttl = Some(ttl);
        self
    }

    /// Set the result cache TTL
    pub fn result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = Some(ttl);
        self
    }

    /// Set the result TTL jitter factor (0.0 - 1.0)
    pub fn result_ttl_jitter(mut self, jitter: f64) -> Self {
        self.result_ttl_jitter = Some(jitter);
        self
    }

    /// Set the probe interval
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = Some(interval);
        self
    }

    /// Set the probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set the consecutive-failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Set the default recommendation count
    pub fn default_recommendations(mut self, count: usize) -> Self {
        self.default_recommendations = Some(count);
        self
    }

    /// Set the maximum recommendation count
    pub fn max_recommendations(mut self, count: usize) -> Self {
        self.max_recommendations = Some(count);
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        let defaults = EngineConfig::default();

        EngineConfig {
            region: self.region.unwrap_or(defaults.region),
            similarity_threshold: self
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            neighbor_cap: self.neighbor_cap.unwrap_or(defaults.neighbor_cap),
            model_ttl: self.model_ttl.unwrap_or(defaults.model_ttl),
            result_ttl: self.result_ttl.unwrap_or(defaults.result_ttl),
            result_ttl_jitter: self.result_ttl_jitter.unwrap_or(defaults.result_ttl_jitter),
            probe_interval: self.probe_interval.unwrap_or(defaults.probe_interval),
            probe_timeout: self.probe_timeout.unwrap_or(defaults.probe_timeout),
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            default_recommendations: self
                .default_recommendations
                .unwrap_or(defaults.default_recommendations),
            max_recommendations: self
                .max_recommendations
                .unwrap_or(defaults.max_recommendations),
        }
    }
}
