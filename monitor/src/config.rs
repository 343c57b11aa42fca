//! Relay configuration
//!
//! Configuration is loaded from environment variables; every field has a
//! sensible default so the relay runs with no environment at all.

use std::env;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use crate::ports::{DEFAULT_HTTP_RANGE, DEFAULT_WS_RANGE};

/// Main relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port scan range for the HTTP server
    pub http_port_range: Range<u16>,
    /// Port scan range for the WebSocket server (disjoint from HTTP)
    pub ws_port_range: Range<u16>,
    /// Directory holding the dashboard assets served at `/`
    pub dashboard_dir: PathBuf,
    /// Directory the discovery file is written into
    pub discovery_dir: PathBuf,
    /// Broadcast delivery tuning
    pub broadcast: BroadcastConfig,
}

/// Broadcast-related configuration
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Per-connection outbound channel depth
    pub channel_capacity: usize,
    /// Upper bound on a single delivery attempt; a client that cannot accept
    /// the message within this window is dropped from the registry
    pub send_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port_range: DEFAULT_HTTP_RANGE,
            ws_port_range: DEFAULT_WS_RANGE,
            dashboard_dir: PathBuf::from("dashboard"),
            discovery_dir: PathBuf::from("."),
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            send_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(range) = range_from_env("HTTP_PORT_START", "HTTP_PORT_END") {
            config.http_port_range = range;
        }
        if let Some(range) = range_from_env("WS_PORT_START", "WS_PORT_END") {
            config.ws_port_range = range;
        }
        if let Ok(dir) = env::var("DASHBOARD_DIR")
            && !dir.is_empty()
        {
            config.dashboard_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("DISCOVERY_DIR")
            && !dir.is_empty()
        {
            config.discovery_dir = PathBuf::from(dir);
        }
        if let Ok(val) = env::var("BROADCAST_CHANNEL_CAPACITY")
            && let Ok(v) = val.parse()
        {
            config.broadcast.channel_capacity = v;
        }
        if let Ok(val) = env::var("BROADCAST_SEND_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.broadcast.send_timeout = Duration::from_millis(ms);
        }

        config
    }
}

fn range_from_env(start_var: &str, end_var: &str) -> Option<Range<u16>> {
    let start = env::var(start_var).ok()?.parse().ok()?;
    let end = env::var(end_var).ok()?.parse().ok()?;
    if start < end { Some(start..end) } else { None }
}
