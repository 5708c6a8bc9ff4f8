//! Region monitor behavior under flapping and dead probes, and the
//! failover order the router follows.

use async_trait::async_trait;
use georec::{EngineConfig, RecError, RegionMonitor, RegionProbe, RegionStatus};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Probe whose outcome is flipped from the test
struct SwitchProbe {
    up: Arc<AtomicBool>,
    checks: AtomicU64,
}

impl SwitchProbe {
    fn new(up: Arc<AtomicBool>) -> Self {
        Self {
            up,
            checks: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RegionProbe for SwitchProbe {
    async fn check(&self) -> georec::Result<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RecError::Store("region endpoint unreachable".to_string()))
        }
    }
}

struct HealthyProbe;

#[async_trait]
impl RegionProbe for HealthyProbe {
    async fn check(&self) -> georec::Result<()> {
        Ok(())
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig::builder()
        .probe_interval(Duration::from_millis(15))
        .probe_timeout(Duration::from_millis(50))
        .build()
}

#[tokio::test]
async fn outage_walks_through_degraded_to_unhealthy_and_back() {
    let monitor = Arc::new(RegionMonitor::new(fast_config()));
    let up = Arc::new(AtomicBool::new(true));
    monitor
        .register("us-east-1", 0, Arc::new(SwitchProbe::new(Arc::clone(&up))))
        .await;

    assert_eq!(
        monitor.probe_once("us-east-1").await.unwrap(),
        RegionStatus::Healthy
    );

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

    // Extra failures keep it unhealthy rather than wrapping around
    assert_eq!(
        monitor.probe_once("us-east-1").await.unwrap(),
        RegionStatus::Unhealthy
    );

    up.store(true, Ordering::SeqCst);
    assert_eq!(
        monitor.probe_once("us-east-1").await.unwrap(),
        RegionStatus::Healthy
    );
}

#[tokio::test]
async fn routing_falls_over_in_proximity_order() {
    let monitor = Arc::new(RegionMonitor::new(fast_config()));
    let near_up = Arc::new(AtomicBool::new(true));
    let mid_up = Arc::new(AtomicBool::new(true));

    monitor
        .register("near", 0, Arc::new(SwitchProbe::new(Arc::clone(&near_up))))
        .await;
    monitor
        .register("mid", 1, Arc::new(SwitchProbe::new(Arc::clone(&mid_up))))
        .await;
    monitor.register("far", 2, Arc::new(HealthyProbe)).await;

    assert_eq!(monitor.route().await.unwrap(), "near");

    // near goes fully down; mid is next closest healthy
    near_up.store(false, Ordering::SeqCst);
    for _ in 0..3 {
        monitor.probe_once("near").await.unwrap();
    }
    assert_eq!(monitor.route().await.unwrap(), "mid");

    // mid degrades but stays routable; far is healthy and wins
    mid_up.store(false, Ordering::SeqCst);
    monitor.probe_once("mid").await.unwrap();
    assert_eq!(monitor.route().await.unwrap(), "far");

    // far dies too; degraded mid is the last resort
    for _ in 0..3 {
        monitor.record_probe("far", false).await.unwrap();
    }
    assert_eq!(monitor.route().await.unwrap(), "mid");
}

#[tokio::test]
async fn all_regions_down_is_a_typed_error() {
    let monitor = Arc::new(RegionMonitor::new(fast_config()));
    monitor.register("only", 0, Arc::new(HealthyProbe)).await;

    for _ in 0..3 {
        monitor.record_probe("only", false).await.unwrap();
    }

    assert!(matches!(
        monitor.route().await,
        Err(RecError::NoRegionAvailable)
    ));

    // An empty monitor behaves the same
    let empty = RegionMonitor::new(fast_config());
    assert!(matches!(
        empty.route().await,
        Err(RecError::NoRegionAvailable)
    ));
}

#[tokio::test]
async fn background_loops_drive_status_without_manual_probes() {
    let monitor = Arc::new(RegionMonitor::new(fast_config()));
    let up = Arc::new(AtomicBool::new(false));
    monitor
        .register("flappy", 0, Arc::new(SwitchProbe::new(Arc::clone(&up))))
        .await;

    let handles = monitor.start().await;

    // Enough ticks for three consecutive failures
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(
        monitor.status("flappy").await,
        Some(RegionStatus::Unhealthy)
    );

    // Recovery needs exactly one good probe
    up.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(monitor.status("flappy").await, Some(RegionStatus::Healthy));

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn report_carries_failure_counts_and_latency() {
    let monitor = Arc::new(RegionMonitor::new(fast_config()));
    let up = Arc::new(AtomicBool::new(false));
    monitor
        .register("us-east-1", 0, Arc::new(SwitchProbe::new(up)))
        .await;
    monitor
        .register("eu-west-1", 1, Arc::new(HealthyProbe))
        .await;

    monitor.probe_once("us-east-1").await.unwrap();
    monitor.probe_once("us-east-1").await.unwrap();
    monitor.probe_once("eu-west-1").await.unwrap();

    let reports = monitor.report().await;
    assert_eq!(reports.len(), 2);

    let east = reports.iter().find(|r| r.region == "us-east-1").unwrap();
    assert_eq!(east.status, RegionStatus::Degraded);
    assert_eq!(east.consecutive_failures, 2);
    assert!(east.last_probe_at.is_some());

    let west = reports.iter().find(|r| r.region == "eu-west-1").unwrap();
    assert_eq!(west.status, RegionStatus::Healthy);
    assert_eq!(west.consecutive_failures, 0);
    assert!(west.last_latency_ms.is_some());
}
