//! Periodic cluster poller.
//!
//! Asks the inspector for a snapshot on every tick and publishes it to the
//! registry. A failed tick publishes nothing and waits for the next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_FAILURE_WARN_THRESHOLD;
use crate::inspector::{inspect, ClusterInspector};
use crate::registry::SubscriberRegistry;

/// Counters describing the poller's recent behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Ticks handled so far.
    pub ticks: u64,
    /// Ticks that published a snapshot.
    pub successes: u64,
    /// Ticks skipped because the inspector failed.
    pub failures: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When a snapshot was last published.
    pub last_success: Option<DateTime<Utc>>,
}

/// Polls the cluster on a fixed interval and fans results out to subscribers.
pub struct ClusterPoller {
    inspector: Arc<dyn ClusterInspector>,
    registry: SubscriberRegistry,
    interval: Duration,
    failure_warn_threshold: u32,
    stats: Arc<RwLock<PollerStats>>,
}

impl std::fmt::Debug for ClusterPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterPoller")
            .field("inspector", &self.inspector.name())
            .field("interval", &self.interval)
            .field("subscribers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl ClusterPoller {
    /// Create a poller publishing into `registry`.
    #[must_use]
    pub fn new(
        inspector: Arc<dyn ClusterInspector>,
        registry: SubscriberRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            inspector,
            registry,
            interval,
            failure_warn_threshold: DEFAULT_FAILURE_WARN_THRESHOLD,
            stats: Arc::new(RwLock::new(PollerStats::default())),
        }
    }

    /// Set how many consecutive failures are tolerated before logging warnings.
    #[must_use]
    pub const fn with_failure_warn_threshold(mut self, threshold: u32) -> Self {
        self.failure_warn_threshold = threshold;
        self
    }

    /// Shared handle to the poller's counters.
    #[must_use]
    pub fn stats(&self) -> Arc<RwLock<PollerStats>> {
        Arc::clone(&self.stats)
    }

    /// Run the poller on its own task until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// The first poll happens one full interval after start.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            inspector = self.inspector.name(),
            interval = ?self.interval,
            "cluster poller started"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    // Cancellation also interrupts an in-flight inspection.
                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => break,
                        () = self.poll_once() => {}
                    }
                }
            }
        }

        info!("cluster poller stopped");
    }

    /// Run one poll cycle: inspect, then publish on success.
    pub async fn poll_once(&self) {
        match inspect(&self.inspector).await {
            Ok(state) => {
                let delivered = self.registry.publish(state.into_snapshot());
                let recovered_after = {
                    let mut stats = self.stats.write();
                    let previous = stats.consecutive_failures;
                    stats.ticks += 1;
                    stats.successes += 1;
                    stats.consecutive_failures = 0;
                    stats.last_success = Some(Utc::now());
                    previous
                };
                if recovered_after >= self.failure_warn_threshold {
                    info!(failures = recovered_after, "cluster inspection recovered");
                }
                debug!(subscribers = delivered, "published cluster snapshot");
            }
            Err(e) => {
                let consecutive = {
                    let mut stats = self.stats.write();
                    stats.ticks += 1;
                    stats.failures += 1;
                    stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
                    stats.consecutive_failures
                };
                if consecutive >= self.failure_warn_threshold {
                    warn!(error = %e, consecutive, "cluster inspection keeps failing");
                } else {
                    debug!(error = %e, consecutive, "cluster inspection failed, skipping tick");
                }
            }
        }
    }
}
