//! Test helpers for streaming tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use pulse_proto::{ClusterState, Node, NodeStatus, WireMessage};
use pulse_server::{
    ClusterInspector, ClusterPoller, InspectError, PulseServer, ServerConfig, ServerResult,
    SubscriberRegistry,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Default test timeout.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket client connected to a test server.
pub type Viewer = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inspector whose next result is set by the test.
///
/// `Ok(n)` yields a cluster of `n` ready nodes, `Err` fails the call.
#[derive(Debug)]
pub struct SwitchInspector {
    next: Mutex<Result<usize, String>>,
}

impl SwitchInspector {
    pub fn new(nodes: usize) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(Ok(nodes)),
        })
    }

    pub fn set_nodes(&self, nodes: usize) {
        *self.next.lock() = Ok(nodes);
    }

    pub fn set_failing(&self, message: &str) {
        *self.next.lock() = Err(message.to_string());
    }
}

impl ClusterInspector for SwitchInspector {
    fn snapshot(&self) -> Result<ClusterState, InspectError> {
        match &*self.next.lock() {
            Ok(count) => Ok(cluster_of(*count)),
            Err(msg) => Err(InspectError::Unavailable(msg.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "switch"
    }
}

/// Build a cluster of `count` ready nodes named `node-0`, `node-1`, ...
pub fn cluster_of(count: usize) -> ClusterState {
    ClusterState::new(
        (0..count)
            .map(|i| Node::new(format!("id-{i}"), format!("node-{i}"), NodeStatus::Ready))
            .collect(),
    )
}

/// Server running on an ephemeral port with its own shutdown token.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: PulseServer,
    pub registry: SubscriberRegistry,
    pub inspector: Arc<SwitchInspector>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<ServerResult<()>>,
}

impl TestServer {
    /// Start a server whose inspector reports `nodes` nodes.
    pub async fn start(nodes: usize) -> Self {
        Self::start_with(nodes, ServerConfig::default()).await
    }

    /// Start a server with a custom configuration.
    pub async fn start_with(nodes: usize, config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let inspector = SwitchInspector::new(nodes);
        let registry = SubscriberRegistry::new();
        let server = PulseServer::new(
            config.with_shutdown_grace(Duration::from_secs(2)),
            registry.clone(),
            inspector.clone(),
        );
        let shutdown = CancellationToken::new();

        let handle = {
            let server = server.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.run(listener, shutdown).await })
        };

        Self {
            addr,
            server,
            registry,
            inspector,
            shutdown,
            handle,
        }
    }

    /// A poller driven by this server's inspector and registry.
    pub fn poller(&self, interval: Duration) -> ClusterPoller {
        let inspector: Arc<dyn ClusterInspector> = self.inspector.clone();
        ClusterPoller::new(inspector, self.registry.clone(), interval)
    }

    /// URL of the streaming endpoint.
    pub fn stream_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Connect a viewer to the streaming endpoint.
    pub async fn connect(&self) -> Viewer {
        let (ws, _) = timeout(TEST_TIMEOUT, connect_async(self.stream_url()))
            .await
            .expect("connect timed out")
            .expect("connect failed");
        ws
    }

    /// Wait until exactly `expected` subscribers are registered.
    pub async fn wait_for_subscribers(&self, expected: usize) {
        timeout(TEST_TIMEOUT, async {
            while self.registry.len() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {expected} subscribers, still have {}",
                self.registry.len()
            )
        });
    }
}

/// Read frames until the next cluster state arrives.
pub async fn next_state(viewer: &mut Viewer) -> ClusterState {
    timeout(TEST_TIMEOUT, async {
        loop {
            match viewer.next().await {
                Some(Ok(WsMessage::Text(text))) => match WireMessage::decode(text.as_str()) {
                    Ok(WireMessage::State(state)) => return state,
                    Err(e) => panic!("undecodable frame {text}: {e}"),
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => panic!("viewer read failed: {e}"),
                None => panic!("stream ended before a state arrived"),
            }
        }
    })
    .await
    .expect("timed out waiting for state")
}

/// Assert that no state frame arrives within `window`.
pub async fn assert_quiet(viewer: &mut Viewer, window: Duration) {
    let result = timeout(window, async {
        loop {
            match viewer.next().await {
                Some(Ok(WsMessage::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => {}
                _ => return None,
            }
        }
    })
    .await;

    if let Ok(Some(frame)) = result {
        panic!("unexpected frame: {frame}");
    }
}
