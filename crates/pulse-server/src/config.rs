//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default interval between cluster polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default interval between keepalive pings on a session.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for control frames (ping, pong, close).
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

/// Default deadline for a relayed snapshot write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for the first snapshot sent after upgrade.
pub const DEFAULT_INITIAL_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default grace period for sessions to close during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default number of consecutive poll failures before they are logged as warnings.
pub const DEFAULT_FAILURE_WARN_THRESHOLD: u32 = 3;

/// Configuration for the streaming server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Interval between cluster polls.
    pub poll_interval: Duration,
    /// WebSocket ping interval for keepalive.
    pub ping_interval: Duration,
    /// Deadline for ping, pong and close frames.
    pub control_timeout: Duration,
    /// Deadline for each relayed snapshot write.
    pub write_timeout: Duration,
    /// Deadline for the initial snapshot write.
    pub initial_write_timeout: Duration,
    /// How long shutdown waits for sessions before aborting them.
    pub shutdown_grace: Duration,
    /// Path of the liveness endpoint.
    pub health_path: String,
    /// Path of the streaming endpoint.
    pub stream_path: String,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
    /// Consecutive poll failures after which failures are logged as warnings.
    pub failure_warn_threshold: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            ping_interval: DEFAULT_PING_INTERVAL,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            initial_write_timeout: DEFAULT_INITIAL_WRITE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            health_path: "/health".to_string(),
            stream_path: "/ws".to_string(),
            cors_origins: Vec::new(),
            failure_warn_threshold: DEFAULT_FAILURE_WARN_THRESHOLD,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the WebSocket ping interval.
    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the control frame timeout.
    #[must_use]
    pub const fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    /// Set the relayed write timeout.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the initial write timeout.
    #[must_use]
    pub const fn with_initial_write_timeout(mut self, timeout: Duration) -> Self {
        self.initial_write_timeout = timeout;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the liveness endpoint path.
    #[must_use]
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Set the streaming endpoint path.
    #[must_use]
    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }

    /// Set the consecutive failure warning threshold.
    #[must_use]
    pub const fn with_failure_warn_threshold(mut self, threshold: u32) -> Self {
        self.failure_warn_threshold = threshold;
        self
    }
}
