//! # pulse-proto
//!
//! Data model for cluster snapshots streamed to live viewers, and the wire
//! message that carries them.
//!
//! A [`ClusterState`] is a total value: every metric defaults to zero and every
//! list defaults to empty, so any snapshot can be encoded directly. Once
//! published it is shared as a [`Snapshot`] and never mutated.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod messages;
pub mod types;

pub use error::{ProtoError, ProtoResult};
pub use messages::WireMessage;
pub use types::{
    ClusterState, Node, NodeStatus, Pod, PodMetrics, PodStatus, ResourceMetrics, Snapshot,
};
