//! Endpoint configuration and link tuning knobs.

use parking_lot::RwLock;
use std::fmt;
use std::time::Duration;

/// Where the external display lives.
///
/// The host stays a string because the settings collaborator may hand over a
/// hostname rather than an IP; resolution happens at dial time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Supplies the current display endpoint.
///
/// The connection re-reads it on every attempt and treats a live socket whose
/// dialed endpoint no longer matches as stale.
pub trait ConfigProvider: Send + Sync {
    fn endpoint(&self) -> Endpoint;
}

/// Runtime-mutable endpoint holder, shared with a settings collaborator.
pub struct SharedConfig {
    current: RwLock<Endpoint>,
}

impl SharedConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            current: RwLock::new(endpoint),
        }
    }

    /// Points the link at a different display. Takes effect on the next
    /// connection check; an existing socket to the old endpoint is torn down
    /// there, not here.
    pub fn set_endpoint(&self, endpoint: Endpoint) {
        *self.current.write() = endpoint;
    }
}

impl ConfigProvider for SharedConfig {
    fn endpoint(&self) -> Endpoint {
        self.current.read().clone()
    }
}

/// Link tuning: timeouts, timer intervals and the always-send debug mode.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Deadline for one connection attempt (and for waiting on one already
    /// in flight).
    pub connect_timeout: Duration,
    /// Per-read deadline while waiting for a reply frame.
    pub reply_timeout: Duration,
    /// Scheduler tick cadence.
    pub tick_interval: Duration,
    /// How often the keepalive flag is raised.
    pub ping_interval: Duration,
    /// How often the clock-sync flag is raised.
    pub time_sync_interval: Duration,
    /// Push the routing snapshot on every eligible tick, unchanged or not.
    pub always_send: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_millis(500),
            ping_interval: Duration::from_secs(5),
            time_sync_interval: Duration::from_secs(60),
            always_send: false,
        }
    }
}

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_time_sync_interval(mut self, interval: Duration) -> Self {
        self.time_sync_interval = interval;
        self
    }

    pub fn with_always_send(mut self) -> Self {
        self.always_send = true;
        self
    }
}
