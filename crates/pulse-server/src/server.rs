//! Transport server: accepts viewers and coordinates graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::inspector::ClusterInspector;
use crate::registry::SubscriberRegistry;
use crate::routes::create_router;
use crate::state::ServerState;

/// HTTP server exposing the liveness and streaming endpoints.
#[derive(Debug, Clone)]
pub struct PulseServer {
    state: Arc<ServerState>,
}

impl PulseServer {
    /// Create a server streaming from `registry`, using `inspector` for
    /// each viewer's initial snapshot.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        registry: SubscriberRegistry,
        inspector: Arc<dyn ClusterInspector>,
    ) -> Self {
        let state = Arc::new(ServerState::new(config, registry, inspector));
        Self { state }
    }

    /// Get the server state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Number of sessions currently running.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.sessions().len()
    }

    /// Number of subscribers currently registered.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.registry().len()
    }

    /// Create the router without starting the server.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }

    /// Bind `addr` and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] if the listener cannot be bound, or
    /// [`ServerError::Serve`] if serving fails after startup.
    pub async fn start(&self, addr: SocketAddr, shutdown: CancellationToken) -> ServerResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e))?;

        self.run(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    ///
    /// On cancellation the listener stops accepting, every session is told to
    /// close, and sessions still open after the grace period are aborted.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Serve`] if serving fails before shutdown.
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) -> ServerResult<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "server listening");
        }

        let router = create_router(Arc::clone(&self.state));
        let stop_accepting = shutdown.clone();
        let mut serve = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(stop_accepting.cancelled_owned())
                .await
        });

        // The serve task stops on the same token, so cancellation must win ties.
        let failed = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            result = &mut serve => Some(result),
        };

        let grace = self.state.config().shutdown_grace;
        let deadline = Instant::now() + grace;

        if let Some(result) = failed {
            let error = match result {
                Ok(Ok(())) if shutdown.is_cancelled() => None,
                Ok(Ok(())) => Some(std::io::Error::other("server stopped unexpectedly")),
                Ok(Err(e)) => Some(e),
                Err(e) => Some(std::io::Error::other(e.to_string())),
            };
            self.close_sessions(grace).await;
            if let Some(error) = error {
                return Err(ServerError::Serve(error));
            }
            info!("server shut down");
            return Ok(());
        }

        info!(sessions = self.session_count(), "shutdown requested");
        self.close_sessions(grace).await;

        if timeout_at(deadline, &mut serve).await.is_err() {
            warn!("http connections still open after grace period, aborting");
            serve.abort();
        }

        info!("server shut down");
        Ok(())
    }

    async fn close_sessions(&self, grace: std::time::Duration) {
        self.state.close_sessions();
        let open = self.state.sessions().len();
        if !self.state.sessions().drain(grace).await {
            warn!(open, ?grace, "sessions still open after grace period were aborted");
        }
    }
}
