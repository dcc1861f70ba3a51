//! Shared state for the streaming server.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::inspector::ClusterInspector;
use crate::registry::SubscriberRegistry;
use crate::session::{ConnectionSession, SessionSettings};

/// Tracks running session tasks so shutdown can wait for them, then abort.
#[derive(Debug, Default)]
pub struct SessionTracker {
    tracker: TaskTracker,
    tasks: Mutex<JoinSet<()>>,
}

impl SessionTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a session task.
    pub fn spawn<F>(&self, session: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        // Reap finished sessions so the set only holds live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(self.tracker.track_future(session));
    }

    /// Number of sessions still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Whether no session is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait up to `grace` for all sessions to finish, then abort the rest.
    ///
    /// Returns `true` if every session finished on its own.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        if !finished {
            self.tasks.lock().abort_all();
            self.tracker.wait().await;
        }
        finished
    }
}

/// State shared by the router, handlers and the server.
pub struct ServerState {
    config: Arc<ServerConfig>,
    registry: SubscriberRegistry,
    inspector: Arc<dyn ClusterInspector>,
    sessions: SessionTracker,
    closing: CancellationToken,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("inspector", &self.inspector.name())
            .field("subscribers", &self.registry.len())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Create server state around an existing registry and inspector.
    pub fn new(
        config: ServerConfig,
        registry: SubscriberRegistry,
        inspector: Arc<dyn ClusterInspector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            inspector,
            sessions: SessionTracker::new(),
            closing: CancellationToken::new(),
        }
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Subscriber registry.
    #[must_use]
    pub const fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Running sessions.
    #[must_use]
    pub const fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Build a session bound to this server's registry, inspector and shutdown signal.
    #[must_use]
    pub fn new_session(&self) -> ConnectionSession {
        ConnectionSession::new(
            self.registry.clone(),
            Arc::clone(&self.inspector),
            SessionSettings::from(self.config.as_ref()),
            self.closing.child_token(),
        )
    }

    /// Tell every session to close.
    pub fn close_sessions(&self) {
        self.closing.cancel();
    }

    /// Whether sessions have been told to close.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }
}
