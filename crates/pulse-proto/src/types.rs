//! Cluster snapshot types.
//!
//! Every field carries a default so that a partially known cluster still
//! produces a complete value: unknown metrics are zero, unknown statuses are
//! the "unknown"/"error" variants, and lists are empty rather than absent.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A published, immutable cluster snapshot shared between all subscribers.
pub type Snapshot = Arc<ClusterState>;

/// Usage figures for one resource kind.
///
/// All four quantities share one unit: milli-cores for CPU, bytes for memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceMetrics {
    /// Observed usage.
    pub usage: u64,
    /// Sum of declared requests.
    pub requests: u64,
    /// Sum of declared limits.
    pub limits: u64,
    /// Total allocatable capacity.
    pub capacity: u64,
}

impl ResourceMetrics {
    /// Create a metrics record from its four quantities.
    #[must_use]
    pub const fn new(usage: u64, requests: u64, limits: u64, capacity: u64) -> Self {
        Self {
            usage,
            requests,
            limits,
            capacity,
        }
    }

    /// Fraction of capacity in use, or `0.0` when capacity is unknown.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.usage as f64 / self.capacity as f64
        }
    }
}

/// CPU and memory metrics for a single pod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PodMetrics {
    /// CPU in milli-cores.
    pub cpu: ResourceMetrics,
    /// Memory in bytes.
    pub memory: ResourceMetrics,
}

/// Readiness of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// The node reports itself ready for workloads.
    Ready,
    /// The node reports a readiness condition that is not true.
    NotReady,
    /// No readiness condition was observed.
    #[default]
    Unknown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "Ready",
            Self::NotReady => "NotReady",
            Self::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

/// Coarse lifecycle phase of a pod.
///
/// Every phase that is neither running nor pending collapses to `Error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodStatus {
    /// All containers are bound to a node and at least one is running.
    Running,
    /// Accepted but not yet running.
    Pending,
    /// Any other phase (failed, succeeded, unknown).
    #[default]
    Error,
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Pending => "pending",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A workload instance scheduled on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pod {
    /// Stable unique identifier.
    pub id: String,
    /// Pod name.
    pub name: String,
    /// Namespace the pod lives in.
    pub namespace: String,
    /// Lifecycle phase.
    pub status: PodStatus,
    /// Name of the node the pod is bound to.
    ///
    /// May name a node absent from the same snapshot while the pod is moving.
    pub node: String,
    /// Resource metrics.
    pub metrics: PodMetrics,
}

impl Pod {
    /// Create a pod with zeroed metrics and no node binding.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        status: PodStatus,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            namespace: namespace.into(),
            status,
            node: String::new(),
            metrics: PodMetrics::default(),
        }
    }

    /// Set the pod metrics.
    #[must_use]
    pub const fn with_metrics(mut self, metrics: PodMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Bind the pod to a node by name.
    #[must_use]
    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }
}

/// A compute node and the pods bound to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    /// Stable unique identifier.
    pub id: String,
    /// Node name, referenced by [`Pod::node`].
    pub name: String,
    /// Readiness.
    pub status: NodeStatus,
    /// CPU metrics in milli-cores.
    pub metrics: ResourceMetrics,
    /// Pods bound to this node, in observation order.
    pub pods: Vec<Pod>,
}

impl Node {
    /// Create a node with zeroed metrics and no pods.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            metrics: ResourceMetrics::default(),
            pods: Vec::new(),
        }
    }

    /// Set the node metrics.
    #[must_use]
    pub const fn with_metrics(mut self, metrics: ResourceMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach a pod to this node.
    ///
    /// The pod is bound to this node's name and its CPU requests and limits
    /// are added to the node's totals.
    pub fn push_pod(&mut self, mut pod: Pod) {
        pod.node.clone_from(&self.name);
        self.metrics.requests = self.metrics.requests.saturating_add(pod.metrics.cpu.requests);
        self.metrics.limits = self.metrics.limits.saturating_add(pod.metrics.cpu.limits);
        self.pods.push(pod);
    }

    /// Builder form of [`Node::push_pod`].
    #[must_use]
    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.push_pod(pod);
        self
    }
}

/// The full observed state of the cluster at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterState {
    /// Nodes in observation order.
    pub nodes: Vec<Node>,
}

impl ClusterState {
    /// Create a cluster state from its nodes.
    #[must_use]
    pub const fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Look up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Total number of pods across all nodes.
    #[must_use]
    pub fn pod_count(&self) -> usize {
        self.nodes.iter().map(|n| n.pods.len()).sum()
    }

    /// Pods that reference a node not present in this snapshot.
    ///
    /// Pods observed mid-transition can legitimately show up here.
    pub fn orphaned_pods(&self) -> impl Iterator<Item = &Pod> {
        let names: HashSet<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
        self.nodes
            .iter()
            .flat_map(|n| n.pods.iter())
            .filter(move |p| !p.node.is_empty() && !names.contains(p.node.as_str()))
    }

    /// Freeze this state into a shareable snapshot.
    #[must_use]
    pub fn into_snapshot(self) -> Snapshot {
        Arc::new(self)
    }
}
