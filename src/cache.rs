//! Request-level result cache
//!
//! Short-TTL cache of computed recommendation lists, keyed by
//! (user, region, count). Region is part of the key because regions may
//! diverge slightly in catalog and model version. Expiry is lazy on read;
//! the sweep exists only to bound memory. The cache never computes and a
//! failing backend only ever costs the caller a recomputation.

use crate::engine::ScoredProduct;
use crate::error::{RecError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Composite key for a cached recommendation list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub user_id: String,
    pub region: String,
    pub count: usize,
}

impl ResultKey {
    pub fn new(user_id: impl Into<String>, region: impl Into<String>, count: usize) -> Self {
        Self {
            user_id: user_id.into(),
            region: region.into(),
            count,
        }
    }
}

impl std::fmt::Display for ResultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.region, self.user_id, self.count)
    }
}

/// A cached ranked list with its expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    pub products: Vec<ScoredProduct>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedResult {
    fn new(products: Vec<ScoredProduct>, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(300));
        Self {
            products,
            cached_at: now,
            expires_at,
        }
    }

    /// Whether the entry's TTL has elapsed
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Hit/miss counters for the serving health report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions_ttl: u64,
}

impl CacheStats {
    /// Hit ratio in [0, 1]; 0.0 before any traffic
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Capability interface over a result cache backend
///
/// Backends may be remote; any error is treated by callers as a miss (on
/// `get`) or ignored (on `put`) so cache trouble never fails a request.
#[async_trait]
pub trait ResultCacheBackend: Send + Sync {
    async fn get(&self, key: &ResultKey) -> Result<Option<CachedResult>>;
    async fn put(&self, key: ResultKey, result: CachedResult) -> Result<()>;
    async fn invalidate_expired(&self) -> Result<usize>;
    async fn stats(&self) -> CacheStats;
}

/// In-process result cache with lazy TTL expiry
pub struct ResultCache {
    entries: RwLock<HashMap<ResultKey, CachedResult>>,
    stats: RwLock<CacheStats>,
    ttl: Duration,
    jitter: f64,
}

impl ResultCache {
    /// Create a cache with the given TTL and no jitter
    pub fn new(ttl: Duration) -> Self {
        Self::with_jitter(ttl, 0.0)
    }

    /// Create a cache whose per-entry TTL is spread by `jitter` (0.0 - 1.0)
    pub fn with_jitter(ttl: Duration, jitter: f64) -> Self {
        info!(ttl_secs = ttl.as_secs(), jitter, "Initializing result cache");
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            ttl,
            jitter,
        }
    }

    fn entry_ttl(&self) -> Duration {
        if self.jitter == 0.0 {
            return self.ttl;
        }
        let base = self.ttl.as_secs_f64();
        let spread = (rand::random::<f64>() * 2.0 - 1.0) * base * self.jitter;
        Duration::from_secs_f64((base + spread).max(1.0))
    }

    /// Store a computed list under its key; last writer wins
    pub async fn insert(&self, key: ResultKey, products: Vec<ScoredProduct>) {
        let result = CachedResult::new(products, self.entry_ttl());
        let mut entries = self.entries.write().await;
        debug!(key = %key, "Caching recommendation result");
        entries.insert(key, result);

        let mut stats = self.stats.write().await;
        stats.entries = entries.len();
    }

    /// Cached list for a key, expiring lazily on read
    pub async fn lookup(&self, key: &ResultKey) -> Option<CachedResult> {
        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        match entries.get(key) {
            Some(result) if result.is_expired() => {
                debug!(key = %key, "Cached result expired");
                entries.remove(key);
                stats.misses += 1;
                stats.evictions_ttl += 1;
                stats.entries = entries.len();
                None
            }
            Some(result) => {
                debug!(key = %key, "Result cache hit");
                stats.hits += 1;
                Some(result.clone())
            }
            None => {
                debug!(key = %key, "Result cache miss");
                stats.misses += 1;
                None
            }
        }
    }

    /// Sweep out every expired entry; returns how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, result| !result.is_expired());
        let removed = before - entries.len();

        if removed > 0 {
            let mut stats = self.stats.write().await;
            stats.evictions_ttl += removed as u64;
            stats.entries = entries.len();
            debug!(removed, "Swept expired result cache entries");
        }
        removed
    }

    /// Current counters
    pub async fn snapshot_stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    /// Number of live entries (expired-but-unswept included)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCacheBackend for ResultCache {
    async fn get(&self, key: &ResultKey) -> Result<Option<CachedResult>> {
        Ok(self.lookup(key).await)
    }

    async fn put(&self, key: ResultKey, result: CachedResult) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key, result);
        let mut stats = self.stats.write().await;
        stats.entries = entries.len();
        Ok(())
    }

    async fn invalidate_expired(&self) -> Result<usize> {
        Ok(self.sweep_expired().await)
    }

    async fn stats(&self) -> CacheStats {
        self.snapshot_stats().await
    }
}

/// Background task that periodically sweeps expired entries
///
/// Correctness never depends on this; it only bounds memory between reads.
pub async fn start_auto_cleanup(cache: Arc<ResultCache>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "Starting result cache cleanup task");
    loop {
        tokio::time::sleep(interval).await;
        let removed = cache.sweep_expired().await;
        if removed > 0 {
            debug!(removed, "Auto cleanup removed expired results");
        }
    }
}

/// A backend wrapper that simulates failures, for degradation tests
pub struct FlakyCacheBackend<B> {
    inner: B,
    failing: std::sync::atomic::AtomicBool,
}

impl<B: ResultCacheBackend> FlakyCacheBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            failing: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
        if failing {
            warn!("Result cache backend marked as failing");
        }
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            Err(RecError::Cache("cache backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<B: ResultCacheBackend> ResultCacheBackend for FlakyCacheBackend<B> {
    async fn get(&self, key: &ResultKey) -> Result<Option<CachedResult>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: ResultKey, result: CachedResult) -> Result<()> {
        self.check()?;
        self.inner.put(key, result).await
    }

    async fn invalidate_expired(&self) -> Result<usize> {
        self.check()?;
        self.inner.invalidate_expired().await
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }
}

impl CachedResult {
    /// Build an entry directly with a TTL, for backends that need it
    pub fn with_ttl(products: Vec<ScoredProduct>, ttl: Duration) -> Self {
        Self::new(products, ttl)
    }
}
