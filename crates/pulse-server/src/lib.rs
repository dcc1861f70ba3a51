//! # pulse-server
//!
//! Streams live cluster snapshots to any number of WebSocket viewers.
//!
//! A [`ClusterPoller`] asks a [`ClusterInspector`] for the cluster state on a
//! fixed interval and publishes each result to a [`SubscriberRegistry`]. Every
//! viewer connection is a [`ConnectionSession`] holding one subscriber: it
//! sends a directly fetched snapshot first, then relays whatever the registry
//! delivers, pinging the peer to detect dead connections.
//!
//! Publishing never waits on a viewer. Each subscriber has a single-slot
//! mailbox, so a slow viewer only ever catches up to the latest snapshot.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pulse_server::{ClusterPoller, HostInspector, PulseServer, ServerConfig, SubscriberRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let registry = SubscriberRegistry::new();
//!     let inspector: Arc<dyn pulse_server::ClusterInspector> = Arc::new(HostInspector::new());
//!     let shutdown = CancellationToken::new();
//!
//!     let poller = ClusterPoller::new(inspector.clone(), registry.clone(), config.poll_interval)
//!         .spawn(shutdown.clone());
//!     let server = PulseServer::new(config.clone(), registry, inspector);
//!     // server.start(config.bind_addr, shutdown).await.unwrap();
//!     # drop((poller, server));
//! }
//! ```
//!
//! ## Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/health` | GET | Liveness check, always `200 OK` |
//! | `/ws` | GET | WebSocket stream of `{"type":"state","payload":...}` frames |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod inspector;
pub mod poller;
pub mod registry;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;

// Re-export main types
pub use config::ServerConfig;
pub use error::{InspectError, ServerError, ServerResult, SessionError};
pub use inspector::{ClusterInspector, FileInspector, HostInspector};
pub use poller::{ClusterPoller, PollerStats};
pub use registry::{Subscriber, SubscriberId, SubscriberRegistry};
pub use server::PulseServer;
pub use session::{CloseReason, ConnectionSession, SessionSettings};
pub use state::ServerState;
