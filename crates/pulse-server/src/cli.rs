//! Command-line argument parsing with clap.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::ServerConfig;

/// KubePulse - live cluster state streaming.
#[derive(Parser, Debug, Clone)]
#[command(name = "kubepulse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, env = "KUBEPULSE_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,

    /// Seconds between cluster polls.
    #[arg(long, env = "KUBEPULSE_POLL_INTERVAL_SECS", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_secs: u64,

    /// Seconds between keepalive pings on each viewer connection.
    #[arg(long, env = "KUBEPULSE_PING_INTERVAL_SECS", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub ping_interval_secs: u64,

    /// Seconds to wait for viewers to disconnect on shutdown.
    #[arg(long, env = "KUBEPULSE_GRACE_SECS", default_value_t = 5)]
    pub grace_secs: u64,

    /// Read cluster state from this JSON file instead of inspecting the local host.
    #[arg(long, env = "KUBEPULSE_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parse arguments, honouring the legacy `SERVER_ADDR` variable when no
    /// address was given explicitly.
    #[must_use]
    pub fn parse_with_legacy_env() -> Self {
        let mut cli = Self::parse();
        let addr_given = std::env::args().any(|a| a == "--addr" || a.starts_with("--addr="))
            || std::env::var_os("KUBEPULSE_ADDR").is_some();
        if !addr_given {
            if let Some(addr) = std::env::var("SERVER_ADDR").ok().and_then(|v| parse_addr(&v)) {
                cli.addr = addr;
            }
        }
        cli
    }

    /// Build the server configuration described by these arguments.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.addr)
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_ping_interval(Duration::from_secs(self.ping_interval_secs))
            .with_shutdown_grace(Duration::from_secs(self.grace_secs))
    }
}

/// Parse a listen address, accepting the port-only `:8080` form.
#[must_use]
pub fn parse_addr(value: &str) -> Option<SocketAddr> {
    let value = value.trim();
    if let Some(port) = value.strip_prefix(':') {
        return port
            .parse::<u16>()
            .ok()
            .map(|p| SocketAddr::from(([0, 0, 0, 0], p)));
    }
    value.parse().ok()
}
