//! Per-viewer WebSocket session.
//!
//! A session subscribes to the registry, sends one directly fetched snapshot,
//! then runs three loops against the same socket until the first of them
//! ends or shutdown is requested:
//!
//! - relay: forwards every snapshot delivered to the subscriber
//! - keepalive: pings the peer on a fixed interval
//! - reader: answers pings and notices the peer going away
//!
//! Teardown runs once, after all loops have been dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use pulse_proto::{ClusterState, WireMessage};
use tokio::sync::Mutex;
use tokio::time::{interval_at, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::inspector::{inspect, ClusterInspector};
use crate::registry::{Subscriber, SubscriberRegistry};

type SessionSink = Mutex<SplitSink<WebSocket, Message>>;

/// Deadlines and intervals governing one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Deadline for the first snapshot.
    pub initial_write_timeout: Duration,
    /// Deadline for every relayed snapshot.
    pub write_timeout: Duration,
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// Deadline for ping, pong and close frames.
    pub control_timeout: Duration,
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            initial_write_timeout: config.initial_write_timeout,
            write_timeout: config.write_timeout,
            ping_interval: config.ping_interval,
            control_timeout: config.control_timeout,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The initial snapshot could not be written.
    InitialSendFailed(SessionError),
    /// A relayed snapshot could not be written.
    RelayFailed(SessionError),
    /// A ping or pong could not be written.
    KeepaliveFailed(SessionError),
    /// Reading from the peer failed.
    ReadFailed(SessionError),
    /// The peer sent a close frame or hung up.
    PeerClosed,
    /// The subscriber was removed from the registry.
    FeedClosed,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Whether the session ended because of an I/O failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::InitialSendFailed(_)
                | Self::RelayFailed(_)
                | Self::KeepaliveFailed(_)
                | Self::ReadFailed(_)
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialSendFailed(e) => write!(f, "initial send failed: {e}"),
            Self::RelayFailed(e) => write!(f, "relay failed: {e}"),
            Self::KeepaliveFailed(e) => write!(f, "keepalive failed: {e}"),
            Self::ReadFailed(e) => write!(f, "read failed: {e}"),
            Self::PeerClosed => write!(f, "peer closed"),
            Self::FeedClosed => write!(f, "feed closed"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// One viewer connection.
pub struct ConnectionSession {
    id: Uuid,
    registry: SubscriberRegistry,
    inspector: Arc<dyn ClusterInspector>,
    settings: SessionSettings,
    shutdown: CancellationToken,
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ConnectionSession {
    /// Create a session. Nothing is registered until [`run`](Self::run).
    #[must_use]
    pub fn new(
        registry: SubscriberRegistry,
        inspector: Arc<dyn ClusterInspector>,
        settings: SessionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry,
            inspector,
            settings,
            shutdown,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Stream snapshots over an upgraded socket until the session ends.
    pub async fn run(self, socket: WebSocket) -> CloseReason {
        let mut subscriber = self.registry.subscribe();
        let (sink, mut stream) = socket.split();
        let sink = Mutex::new(sink);

        info!(
            session_id = %self.id,
            subscriber = %subscriber.id(),
            subscribers = self.registry.len(),
            "session started"
        );

        let streaming = async {
            if let Err(e) = self.send_initial(&sink, &mut subscriber).await {
                return CloseReason::InitialSendFailed(e);
            }

            tokio::select! {
                reason = self.relay(&sink, &mut subscriber) => reason,
                reason = self.keepalive(&sink) => reason,
                reason = self.read(&sink, &mut stream) => reason,
            }
        };

        let reason = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => CloseReason::Shutdown,
            reason = streaming => reason,
        };

        self.teardown(subscriber, sink, &reason).await;
        reason
    }

    async fn teardown(&self, subscriber: Subscriber, sink: SessionSink, reason: &CloseReason) {
        self.registry.unsubscribe(subscriber);

        let mut sink = sink.into_inner();
        if matches!(reason, CloseReason::Shutdown) {
            let frame = CloseFrame {
                code: close_code::AWAY,
                reason: Utf8Bytes::from_static("server shutting down"),
            };
            let _ = timeout(
                self.settings.control_timeout,
                sink.send(Message::Close(Some(frame))),
            )
            .await;
        }
        let _ = timeout(self.settings.control_timeout, sink.close()).await;

        if reason.is_failure() {
            warn!(session_id = %self.id, reason = %reason, "session closed");
        } else {
            info!(session_id = %self.id, reason = %reason, "session closed");
        }
    }

    /// Send a freshly inspected snapshot ahead of the first poll.
    ///
    /// Inspection failure is not fatal; the viewer waits for the next poll.
    /// A snapshot published while inspecting is discarded so the viewer never
    /// steps back from the initial state to an older one.
    async fn send_initial(
        &self,
        sink: &SessionSink,
        subscriber: &mut Subscriber,
    ) -> Result<(), SessionError> {
        match inspect(&self.inspector).await {
            Ok(state) => {
                if subscriber.try_recv().is_some() {
                    trace!(session_id = %self.id, "dropped snapshot published during initial fetch");
                }
                self.send_state(sink, &state, self.settings.initial_write_timeout)
                    .await?;
                debug!(session_id = %self.id, "initial snapshot sent");
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "initial snapshot unavailable");
            }
        }
        Ok(())
    }

    async fn relay(&self, sink: &SessionSink, subscriber: &mut Subscriber) -> CloseReason {
        while let Some(snapshot) = subscriber.recv().await {
            if let Err(e) = self
                .send_state(sink, &snapshot, self.settings.write_timeout)
                .await
            {
                return CloseReason::RelayFailed(e);
            }
            trace!(session_id = %self.id, "snapshot relayed");
        }
        CloseReason::FeedClosed
    }

    async fn keepalive(&self, sink: &SessionSink) -> CloseReason {
        let period = self.settings.ping_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if let Err(e) = send_frame(
                sink,
                Message::Ping(Bytes::new()),
                self.settings.control_timeout,
                "ping",
            )
            .await
            {
                return CloseReason::KeepaliveFailed(e);
            }
            trace!(session_id = %self.id, "ping sent");
        }
    }

    async fn read(
        &self,
        sink: &SessionSink,
        stream: &mut SplitStream<WebSocket>,
    ) -> CloseReason {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Ping(_)) => {
                    // The socket queues the pong itself; only its delivery is bounded here.
                    if let Err(e) = flush_frames(sink, self.settings.control_timeout, "pong").await {
                        return CloseReason::KeepaliveFailed(e);
                    }
                }
                Ok(Message::Pong(_)) => {
                    trace!(session_id = %self.id, "pong received");
                }
                Ok(Message::Close(frame)) => {
                    debug!(session_id = %self.id, frame = ?frame, "close frame received");
                    return CloseReason::PeerClosed;
                }
                Ok(Message::Text(text)) => {
                    debug!(session_id = %self.id, len = text.len(), "ignoring text message");
                }
                Ok(Message::Binary(data)) => {
                    debug!(session_id = %self.id, len = data.len(), "ignoring binary message");
                }
                Err(e) => return CloseReason::ReadFailed(e.into()),
            }
        }
        CloseReason::PeerClosed
    }

    async fn send_state(
        &self,
        sink: &SessionSink,
        state: &ClusterState,
        limit: Duration,
    ) -> Result<(), SessionError> {
        let frame = WireMessage::encode_state(state)?;
        send_frame(sink, Message::Text(frame.into()), limit, "snapshot write").await
    }
}

/// Write one frame, counting time spent waiting for the sink against `limit`.
async fn send_frame(
    sink: &SessionSink,
    message: Message,
    limit: Duration,
    op: &'static str,
) -> Result<(), SessionError> {
    timeout(limit, async { sink.lock().await.send(message).await })
        .await
        .map_err(|_| SessionError::Timeout { op, timeout: limit })?
        .map_err(SessionError::from)
}

/// Flush frames the socket queued on its own, such as pong replies.
async fn flush_frames(
    sink: &SessionSink,
    limit: Duration,
    op: &'static str,
) -> Result<(), SessionError> {
    timeout(limit, async { sink.lock().await.flush().await })
        .await
        .map_err(|_| SessionError::Timeout { op, timeout: limit })?
        .map_err(SessionError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InspectError;
    use crate::inspector::FileInspector;
    use axum::extract::ws::WebSocketUpgrade;
    use axum::routing::get;
    use axum::Router;
    use pulse_proto::{Node, NodeStatus, Snapshot};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    /// Sessions served on an ephemeral port, reporting how each one ended.
    struct SessionHarness {
        url: String,
        reasons: mpsc::UnboundedReceiver<CloseReason>,
    }

    async fn serve_sessions(
        registry: SubscriberRegistry,
        inspector: Arc<dyn ClusterInspector>,
        settings: SessionSettings,
    ) -> SessionHarness {
        let (tx, reasons) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/",
            get(move |ws: WebSocketUpgrade| {
                let session = ConnectionSession::new(
                    registry.clone(),
                    Arc::clone(&inspector),
                    settings,
                    CancellationToken::new(),
                );
                let tx = tx.clone();
                async move {
                    ws.on_upgrade(move |socket| async move {
                        let _ = tx.send(session.run(socket).await);
                    })
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        SessionHarness {
            url: format!("ws://{addr}/"),
            reasons,
        }
    }

    fn cluster(nodes: usize) -> ClusterState {
        ClusterState::new(
            (0..nodes)
                .map(|i| {
                    Node::new(
                        format!("node-id-{i:08}"),
                        format!("worker-node-{i:08}"),
                        NodeStatus::Ready,
                    )
                })
                .collect(),
        )
    }

    fn no_inspector() -> Arc<dyn ClusterInspector> {
        Arc::new(FileInspector::new("/nonexistent"))
    }

    async fn wait_for_subscribers(registry: &SubscriberRegistry, expected: usize) {
        timeout(Duration::from_secs(5), async {
            while registry.len() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Publish `snapshot` every few milliseconds until a session ends.
    async fn flood_until_closed(
        registry: &SubscriberRegistry,
        harness: &mut SessionHarness,
        snapshot: &Snapshot,
    ) -> CloseReason {
        timeout(Duration::from_secs(20), async {
            loop {
                registry.publish(Arc::clone(snapshot));
                tokio::select! {
                    reason = harness.reasons.recv() => return reason.unwrap(),
                    () = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        })
        .await
        .unwrap()
    }

    /// Publishes an older snapshot while it is being inspected.
    struct RacingInspector {
        registry: SubscriberRegistry,
    }

    impl ClusterInspector for RacingInspector {
        fn snapshot(&self) -> Result<ClusterState, InspectError> {
            self.registry.publish(cluster(1).into_snapshot());
            Ok(cluster(2))
        }

        fn name(&self) -> &'static str {
            "racing"
        }
    }

    #[test]
    fn test_settings_from_config() {
        let config = ServerConfig::default()
            .with_ping_interval(Duration::from_secs(3))
            .with_write_timeout(Duration::from_secs(2))
            .with_initial_write_timeout(Duration::from_secs(4))
            .with_control_timeout(Duration::from_millis(250));

        let settings = SessionSettings::from(&config);

        assert_eq!(settings.ping_interval, Duration::from_secs(3));
        assert_eq!(settings.write_timeout, Duration::from_secs(2));
        assert_eq!(settings.initial_write_timeout, Duration::from_secs(4));
        assert_eq!(settings.control_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.ping_interval, Duration::from_secs(30));
        assert_eq!(settings.write_timeout, Duration::from_secs(5));
        assert_eq!(settings.initial_write_timeout, Duration::from_secs(10));
        assert_eq!(settings.control_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_close_reason_failure_classification() {
        let timeout_err = || SessionError::Timeout {
            op: "snapshot write",
            timeout: Duration::from_secs(5),
        };

        assert!(CloseReason::RelayFailed(timeout_err()).is_failure());
        assert!(CloseReason::KeepaliveFailed(timeout_err()).is_failure());
        assert!(CloseReason::InitialSendFailed(timeout_err()).is_failure());
        assert!(!CloseReason::PeerClosed.is_failure());
        assert!(!CloseReason::Shutdown.is_failure());
        assert!(!CloseReason::FeedClosed.is_failure());
    }

    #[test]
    fn test_close_reason_display() {
        let reason = CloseReason::RelayFailed(SessionError::Timeout {
            op: "snapshot write",
            timeout: Duration::from_secs(5),
        });
        assert_eq!(reason.to_string(), "relay failed: snapshot write timed out after 5s");
        assert_eq!(CloseReason::Shutdown.to_string(), "shutdown");
    }

    #[test]
    fn test_new_session_does_not_subscribe() {
        let registry = SubscriberRegistry::new();
        let session = ConnectionSession::new(
            registry.clone(),
            Arc::new(FileInspector::new("/nonexistent")),
            SessionSettings::default(),
            CancellationToken::new(),
        );

        assert_eq!(session.id().get_version_num(), 4);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_viewer_ends_with_relay_failure() {
        let registry = SubscriberRegistry::new();
        let settings = SessionSettings {
            write_timeout: Duration::from_millis(200),
            ping_interval: Duration::from_secs(3600),
            ..SessionSettings::default()
        };
        let mut harness = serve_sessions(registry.clone(), no_inspector(), settings).await;

        let (_stalled, _) = connect_async(harness.url.as_str()).await.unwrap();
        wait_for_subscribers(&registry, 1).await;

        let reason = flood_until_closed(&registry, &mut harness, &cluster(10_000).into_snapshot()).await;

        assert!(
            matches!(reason, CloseReason::RelayFailed(SessionError::Timeout { op: "snapshot write", .. })),
            "unexpected close reason: {reason}"
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_ping_ends_with_keepalive_failure() {
        let registry = SubscriberRegistry::new();
        let settings = SessionSettings {
            write_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_millis(100),
            control_timeout: Duration::from_millis(100),
            ..SessionSettings::default()
        };
        let mut harness = serve_sessions(registry.clone(), no_inspector(), settings).await;

        let (_stalled, _) = connect_async(harness.url.as_str()).await.unwrap();
        wait_for_subscribers(&registry, 1).await;

        let reason = flood_until_closed(&registry, &mut harness, &cluster(10_000).into_snapshot()).await;

        assert!(
            matches!(reason, CloseReason::KeepaliveFailed(SessionError::Timeout { op: "ping", .. })),
            "unexpected close reason: {reason}"
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_peer_ping_gets_a_single_pong() {
        let registry = SubscriberRegistry::new();
        let harness = serve_sessions(registry.clone(), no_inspector(), SessionSettings::default()).await;

        let (mut viewer, _) = connect_async(harness.url.as_str()).await.unwrap();
        wait_for_subscribers(&registry, 1).await;
        viewer.send(WsMessage::Ping(Bytes::from_static(b"hello"))).await.unwrap();

        let mut pongs = Vec::new();
        let _ = timeout(Duration::from_millis(500), async {
            while let Some(Ok(message)) = viewer.next().await {
                if let WsMessage::Pong(data) = message {
                    pongs.push(data);
                }
            }
        })
        .await;

        assert_eq!(pongs.len(), 1);
        assert_eq!(&pongs[0][..], b"hello");
    }

    #[tokio::test]
    async fn test_publish_during_initial_fetch_is_not_replayed() {
        let registry = SubscriberRegistry::new();
        let inspector = Arc::new(RacingInspector {
            registry: registry.clone(),
        });
        let harness = serve_sessions(registry.clone(), inspector, SessionSettings::default()).await;

        let (mut viewer, _) = connect_async(harness.url.as_str()).await.unwrap();
        let mut received = Vec::new();
        let _ = timeout(Duration::from_millis(500), async {
            while let Some(Ok(message)) = viewer.next().await {
                if let WsMessage::Text(text) = message {
                    let WireMessage::State(state) = WireMessage::decode(text.as_str()).unwrap();
                    received.push(state.nodes.len());
                }
            }
        })
        .await;
        assert_eq!(received, vec![2]);

        registry.publish(cluster(3).into_snapshot());
        let next = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(Ok(WsMessage::Text(text))) = viewer.next().await {
                    return WireMessage::decode(text.as_str()).unwrap();
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(next, WireMessage::State(cluster(3)));
    }
}
