//! Cluster inspectors.
//!
//! An inspector produces one [`ClusterState`] per call. How it observes the
//! cluster is its own business; the poller and sessions only rely on the
//! trait below.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use pulse_proto::{ClusterState, Node, NodeStatus, ResourceMetrics};
use sysinfo::System;
use tracing::debug;

use crate::error::InspectError;

/// Source of cluster snapshots.
///
/// Implementations may block; async callers go through [`inspect`].
pub trait ClusterInspector: Send + Sync {
    /// Observe the cluster once.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster could not be observed this time.
    fn snapshot(&self) -> Result<ClusterState, InspectError>;

    /// Name of this inspector for logging purposes.
    fn name(&self) -> &'static str;
}

/// Run an inspector on the blocking pool and wait for its result.
///
/// # Errors
///
/// Returns the inspector's error, or [`InspectError::TaskFailed`] if the
/// blocking task panicked.
pub async fn inspect(inspector: &Arc<dyn ClusterInspector>) -> Result<ClusterState, InspectError> {
    let inspector = Arc::clone(inspector);
    tokio::task::spawn_blocking(move || inspector.snapshot())
        .await
        .map_err(|e| InspectError::TaskFailed(e.to_string()))?
}

/// Reports the local machine as a single-node cluster.
///
/// CPU figures are in milli-cores: capacity is one thousand per logical CPU
/// and usage is the sampled load since the previous call.
#[derive(Debug)]
pub struct HostInspector {
    id: String,
    name: String,
    system: Mutex<System>,
}

impl HostInspector {
    /// Create an inspector for this host.
    #[must_use]
    pub fn new() -> Self {
        let name = System::host_name().unwrap_or_else(|| "localhost".to_string());
        let mut system = System::new();
        // Prime the CPU counters so the first snapshot has a baseline.
        system.refresh_cpu_usage();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            system: Mutex::new(system),
        }
    }

    /// Override the reported node name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for HostInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterInspector for HostInspector {
    fn snapshot(&self) -> Result<ClusterState, InspectError> {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();

        let cpus = system.cpus();
        if cpus.is_empty() {
            return Err(InspectError::Unavailable("no CPUs reported".to_string()));
        }

        let capacity = cpus.len() as u64 * 1000;
        let usage: u64 = cpus
            .iter()
            .map(|cpu| (f64::from(cpu.cpu_usage()) * 10.0).round() as u64)
            .sum();

        let node = Node::new(&self.id, &self.name, NodeStatus::Ready)
            .with_metrics(ResourceMetrics::new(usage.min(capacity), 0, 0, capacity));

        Ok(ClusterState::new(vec![node]))
    }

    fn name(&self) -> &'static str {
        "host"
    }
}

/// Reads a JSON-encoded [`ClusterState`] from a file on every call.
///
/// Missing fields take their defaults; a missing or malformed file fails
/// only the current call.
#[derive(Debug, Clone)]
pub struct FileInspector {
    path: PathBuf,
}

impl FileInspector {
    /// Create an inspector reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this inspector reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClusterInspector for FileInspector {
    fn snapshot(&self) -> Result<ClusterState, InspectError> {
        let content = std::fs::read_to_string(&self.path)?;
        let state: ClusterState = serde_json::from_str(&content)?;
        debug!(path = %self.path.display(), nodes = state.nodes.len(), "read cluster state");
        Ok(state)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
