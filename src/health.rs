//! Region health monitoring and failover routing
//!
//! Each region is probed on a fixed interval with a bounded timeout; one
//! probe is one pass/fail sample, never retried within itself. The state
//! machine is asymmetric on purpose: one failure demotes healthy to
//! degraded and three consecutive failures mark a region unhealthy, but a
//! single success restores healthy immediately, favoring availability over
//! flap suppression.

use crate::config::EngineConfig;
use crate::error::{RecError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Liveness state of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStatus {
    /// Last probe succeeded
    Healthy,
    /// At least one recent probe failed, below the unhealthy threshold
    Degraded,
    /// Consecutive failures reached the threshold
    Unhealthy,
}

impl RegionStatus {
    /// Whether the router may send traffic here
    pub fn is_routable(&self) -> bool {
        matches!(self, RegionStatus::Healthy | RegionStatus::Degraded)
    }
}

impl std::fmt::Display for RegionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionStatus::Healthy => write!(f, "healthy"),
            RegionStatus::Degraded => write!(f, "degraded"),
            RegionStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Capability interface for probing a region
///
/// Implementations issue whatever liveness call the region exposes; tests
/// substitute scripted fakes.
#[async_trait]
pub trait RegionProbe: Send + Sync {
    /// One liveness sample; any `Err` counts as a failed probe
    async fn check(&self) -> Result<()>;
}

/// Per-region state owned exclusively by the monitor
#[derive(Debug, Clone)]
struct RegionState {
    status: RegionStatus,
    consecutive_failures: u32,
    last_probe_at: Option<DateTime<Utc>>,
    last_latency_ms: Option<u64>,
    /// Lower rank = geographically nearer to this process
    proximity_rank: u32,
}

impl RegionState {
    fn new(proximity_rank: u32) -> Self {
        Self {
            status: RegionStatus::Healthy,
            consecutive_failures: 0,
            last_probe_at: None,
            last_latency_ms: None,
            proximity_rank,
        }
    }

    fn apply(&mut self, success: bool, failure_threshold: u32) -> RegionStatus {
        if success {
            self.consecutive_failures = 0;
            self.status = RegionStatus::Healthy;
        } else {
            self.consecutive_failures += 1;
            self.status = if self.consecutive_failures >= failure_threshold {
                RegionStatus::Unhealthy
            } else {
                RegionStatus::Degraded
            };
        }
        self.status
    }
}

/// Point-in-time view of one region, as exposed to the routing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionReport {
    pub region: String,
    pub status: RegionStatus,
    pub consecutive_failures: u32,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
}

/// Tracks liveness per region and answers routing queries
///
/// Probe loops run independently per region; a slow region can never
/// delay another region's samples.
pub struct RegionMonitor {
    regions: RwLock<HashMap<String, RegionEntry>>,
    config: EngineConfig,
}

struct RegionEntry {
    state: Arc<RwLock<RegionState>>,
    probe: Arc<dyn RegionProbe>,
}

impl RegionMonitor {
    /// Create a monitor with no regions registered
    pub fn new(config: EngineConfig) -> Self {
        Self {
            regions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a region with its probe; lower `proximity_rank` is nearer
    ///
    /// Regions start healthy and earn their real status from probes.
    pub async fn register(
        &self,
        region: impl Into<String>,
        proximity_rank: u32,
        probe: Arc<dyn RegionProbe>,
    ) {
        let region = region.into();
        info!(region = %region, proximity_rank, "Registering region");
        let mut regions = self.regions.write().await;
        regions.insert(
            region,
            RegionEntry {
                state: Arc::new(RwLock::new(RegionState::new(proximity_rank))),
                probe,
            },
        );
    }

    /// Execute one probe of one region and apply the state transition
    ///
    /// The probe is bounded by `probe_timeout`; a timeout is a failure
    /// sample, not a hang.
    pub async fn probe_once(&self, region: &str) -> Result<RegionStatus> {
        let (state, probe) = {
            let regions = self.regions.read().await;
            let entry = regions
                .get(region)
                .ok_or_else(|| RecError::InvalidArgument(format!("unknown region '{}'", region)))?;
            (Arc::clone(&entry.state), Arc::clone(&entry.probe))
        };

        let started = Instant::now();
        let success = match tokio::time::timeout(self.config.probe_timeout, probe.check()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(region, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(region, timeout = ?self.config.probe_timeout, "Probe timed out");
                false
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut state = state.write().await;
        let previous = state.status;
        let status = state.apply(success, self.config.failure_threshold);
        state.last_probe_at = Some(Utc::now());
        state.last_latency_ms = Some(latency_ms);

        if status != previous {
            warn!(region, from = %previous, to = %status, "Region status changed");
        }
        Ok(status)
    }

    /// Record an externally observed probe outcome
    ///
    /// Used when probing is driven by another component; applies the same
    /// transition rules as [`probe_once`](Self::probe_once).
    pub async fn record_probe(&self, region: &str, success: bool) -> Result<RegionStatus> {
        let regions = self.regions.read().await;
        let entry = regions
            .get(region)
            .ok_or_else(|| RecError::InvalidArgument(format!("unknown region '{}'", region)))?;

        let mut state = entry.state.write().await;
        let previous = state.status;
        let status = state.apply(success, self.config.failure_threshold);
        state.last_probe_at = Some(Utc::now());
        if status != previous {
            warn!(region, from = %previous, to = %status, "Region status changed");
        }
        Ok(status)
    }

    /// Current status of one region
    pub async fn status(&self, region: &str) -> Option<RegionStatus> {
        let regions = self.regions.read().await;
        match regions.get(region) {
            Some(entry) => Some(entry.state.read().await.status),
            None => None,
        }
    }

    /// Snapshot of every region for the health surface
    pub async fn report(&self) -> Vec<RegionReport> {
        let regions = self.regions.read().await;
        let mut reports = Vec::with_capacity(regions.len());
        for (region, entry) in regions.iter() {
            let state = entry.state.read().await;
            reports.push(RegionReport {
                region: region.clone(),
                status: state.status,
                consecutive_failures: state.consecutive_failures,
                last_probe_at: state.last_probe_at,
                last_latency_ms: state.last_latency_ms,
            });
        }
        reports.sort_by(|a, b| a.region.cmp(&b.region));
        reports
    }

    /// Pick the region traffic should go to
    ///
    /// Nearest healthy region first; if none, nearest degraded; if none,
    /// [`RecError::NoRegionAvailable`]. Unhealthy regions are never chosen.
    pub async fn route(&self) -> Result<String> {
        let regions = self.regions.read().await;

        let mut best_healthy: Option<(u32, &String)> = None;
        let mut best_degraded: Option<(u32, &String)> = None;

        for (region, entry) in regions.iter() {
            let state = entry.state.read().await;
            let candidate = (state.proximity_rank, region);
            match state.status {
                RegionStatus::Healthy => {
                    if best_healthy.map(|b| candidate < b).unwrap_or(true) {
                        best_healthy = Some(candidate);
                    }
                }
                RegionStatus::Degraded => {
                    if best_degraded.map(|b| candidate < b).unwrap_or(true) {
                        best_degraded = Some(candidate);
                    }
                }
                RegionStatus::Unhealthy => {}
            }
        }

        best_healthy
            .or(best_degraded)
            .map(|(_, region)| region.clone())
            .ok_or(RecError::NoRegionAvailable)
    }

    /// Spawn the independent probe loop for every registered region
    ///
    /// Each loop samples on `probe_interval` until its handle is aborted.
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let regions: Vec<String> = {
            let regions = self.regions.read().await;
            regions.keys().cloned().collect()
        };

        let mut handles = Vec::with_capacity(regions.len());
        for region in regions {
            let monitor = Arc::clone(self);
            let interval = self.config.probe_interval;
            info!(region = %region, interval_secs = interval.as_secs(), "Starting probe loop");
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    if monitor.probe_once(&region).await.is_err() {
                        // Region was deregistered; stop the loop
                        break;
                    }
                }
            }));
        }
        handles
    }
}

/// Probe that always succeeds, for local/self regions
pub struct AlwaysHealthyProbe;

#[async_trait]
impl RegionProbe for AlwaysHealthyProbe {
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Probe scripted from a shared switch
    struct SwitchProbe {
        up: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RegionProbe for SwitchProbe {
        async fn check(&self) -> Result<()> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(RecError::Store("probe target down".to_string()))
            }
        }
    }

    /// Probe that never answers within any reasonable timeout
    struct HangingProbe;

    #[async_trait]
    impl RegionProbe for HangingProbe {
        async fn check(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig::builder()
            .probe_timeout(Duration::from_millis(50))
            .build()
    }

    async fn monitor_with_switch(region: &str, rank: u32) -> (Arc<RegionMonitor>, Arc<AtomicBool>) {
        let monitor = Arc::new(RegionMonitor::new(test_config()));
        let up = Arc::new(AtomicBool::new(true));
        monitor
            .register(region, rank, Arc::new(SwitchProbe { up: Arc::clone(&up) }))
            .await;
        (monitor, up)
    }

    #[tokio::test]
    async fn test_single_failure_degrades() {
        let (monitor, up) = monitor_with_switch("us-east-1", 0).await;

        up.store(false, Ordering::SeqCst);
        let status = monitor.probe_once("us-east-1").await.unwrap();
        assert_eq!(status, RegionStatus::Degraded);
    }

    #[tokio::test]
    async fn test_three_consecutive_failures_mark_unhealthy() {
        let (monitor, up) = monitor_with_switch("us-east-1", 0).await;

        up.store(false, Ordering::SeqCst);
        assert_eq!(
            monitor.probe_once("us-east-1").await.unwrap(),
            RegionStatus::Degraded
        );
        assert_eq!(
            monitor.probe_once("us-east-1").await.unwrap(),
            RegionStatus::Degraded
        );
        assert_eq!(
            monitor.probe_once("us-east-1").await.unwrap(),
            RegionStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_single_success_recovers_immediately() {
        let (monitor, up) = monitor_with_switch("us-east-1", 0).await;

        up.store(false, Ordering::SeqCst);
        for _ in 0..3 {
            monitor.probe_once("us-east-1").await.unwrap();
        }
        assert_eq!(
            monitor.status("us-east-1").await,
            Some(RegionStatus::Unhealthy)
        );

        up.store(true, Ordering::SeqCst);
        let status = monitor.probe_once("us-east-1").await.unwrap();
        assert_eq!(status, RegionStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failures_interrupted_by_success_do_not_accumulate() {
        let (monitor, up) = monitor_with_switch("us-east-1", 0).await;

        up.store(false, Ordering::SeqCst);
        monitor.probe_once("us-east-1").await.unwrap();
        monitor.probe_once("us-east-1").await.unwrap();

        up.store(true, Ordering::SeqCst);
        monitor.probe_once("us-east-1").await.unwrap();

        up.store(false, Ordering::SeqCst);
        // Not consecutive with the earlier two failures
        let status = monitor.probe_once("us-east-1").await.unwrap();
        assert_eq!(status, RegionStatus::Degraded);
    }

    #[tokio::test]
    async fn test_probe_timeout_counts_as_failure() {
        let monitor = Arc::new(RegionMonitor::new(test_config()));
        monitor
            .register("slow-region", 0, Arc::new(HangingProbe))
            .await;

        let status = monitor.probe_once("slow-region").await.unwrap();
        assert_eq!(status, RegionStatus::Degraded);
    }

    #[tokio::test]
    async fn test_route_prefers_nearest_healthy() {
        let monitor = Arc::new(RegionMonitor::new(test_config()));
        monitor
            .register("far-healthy", 2, Arc::new(AlwaysHealthyProbe))
            .await;
        monitor
            .register("near-healthy", 0, Arc::new(AlwaysHealthyProbe))
            .await;

        assert_eq!(monitor.route().await.unwrap(), "near-healthy");
    }

    #[tokio::test]
    async fn test_route_falls_back_to_degraded() {
        let monitor = Arc::new(RegionMonitor::new(test_config()));
        monitor
            .register("near", 0, Arc::new(AlwaysHealthyProbe))
            .await;
        monitor.record_probe("near", false).await.unwrap();
        assert_eq!(monitor.status("near").await, Some(RegionStatus::Degraded));

        assert_eq!(monitor.route().await.unwrap(), "near");
    }

    #[tokio::test]
    async fn test_route_never_picks_unhealthy() {
        let monitor = Arc::new(RegionMonitor::new(test_config()));
        monitor
            .register("only", 0, Arc::new(AlwaysHealthyProbe))
            .await;

        for _ in 0..3 {
            monitor.record_probe("only", false).await.unwrap();
        }
        assert_eq!(monitor.status("only").await, Some(RegionStatus::Unhealthy));

        assert!(matches!(
            monitor.route().await,
            Err(RecError::NoRegionAvailable)
        ));
    }

    #[tokio::test]
    async fn test_route_degraded_beats_farther_degraded() {
        let monitor = Arc::new(RegionMonitor::new(test_config()));
        monitor
            .register("near", 0, Arc::new(AlwaysHealthyProbe))
            .await;
        monitor
            .register("far", 1, Arc::new(AlwaysHealthyProbe))
            .await;

        monitor.record_probe("near", false).await.unwrap();
        monitor.record_probe("far", false).await.unwrap();

        assert_eq!(monitor.route().await.unwrap(), "near");
    }

    #[tokio::test]
    async fn test_report_snapshot() {
        let (monitor, up) = monitor_with_switch("us-east-1", 0).await;
        monitor
            .register("eu-west-1", 1, Arc::new(AlwaysHealthyProbe))
            .await;

        up.store(false, Ordering::SeqCst);
        monitor.probe_once("us-east-1").await.unwrap();
        monitor.probe_once("eu-west-1").await.unwrap();

        let reports = monitor.report().await;
        assert_eq!(reports.len(), 2);
        let by_name: HashMap<&str, &RegionReport> = reports
            .iter()
            .map(|r| (r.region.as_str(), r))
            .collect();
        assert_eq!(by_name["us-east-1"].status, RegionStatus::Degraded);
        assert_eq!(by_name["us-east-1"].consecutive_failures, 1);
        assert_eq!(by_name["eu-west-1"].status, RegionStatus::Healthy);
        assert!(by_name["eu-west-1"].last_latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_probe_loops_run_independently() {
        let config = EngineConfig::builder()
            .probe_interval(Duration::from_millis(20))
            .probe_timeout(Duration::from_millis(30))
            .build();
        let monitor = Arc::new(RegionMonitor::new(config));
        monitor
            .register("slow", 0, Arc::new(HangingProbe))
            .await;
        monitor
            .register("fast", 1, Arc::new(AlwaysHealthyProbe))
            .await;

        let handles = monitor.start().await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        // The hanging region lost its healthy status without blocking the
        // fast region's loop
        assert_ne!(monitor.status("slow").await, Some(RegionStatus::Healthy));
        assert_eq!(monitor.status("fast").await, Some(RegionStatus::Healthy));

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_unknown_region_is_invalid_argument() {
        let monitor = RegionMonitor::new(test_config());
        assert!(matches!(
            monitor.probe_once("ghost").await,
            Err(RecError::InvalidArgument(_))
        ));
        assert!(monitor.status("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_status_is_routable() {
        assert!(RegionStatus::Healthy.is_routable());
        assert!(RegionStatus::Degraded.is_routable());
        assert!(!RegionStatus::Unhealthy.is_routable());
    }
}
