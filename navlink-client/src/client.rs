//! The producer-facing façade.

use crate::config::{ConfigProvider, LinkConfig};
use crate::connection::Connection;
use crate::scheduler::{DueFlags, RoutingSnapshot, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};

/// Client for one external display.
///
/// The producer hands over ready-made routing payload strings via
/// [`schedule_update`](Self::schedule_update); everything else (keepalive,
/// clock sync, reconnects) happens on background tasks once
/// [`start`](Self::start) is called. Producers are expected to debounce their
/// own calls; the only suppression applied here is payload equality.
pub struct DisplayLinkClient {
    conn: Connection,
    flags: Arc<DueFlags>,
    snapshot: Arc<RoutingSnapshot>,
    config: LinkConfig,
}

impl DisplayLinkClient {
    pub fn new(provider: Arc<dyn ConfigProvider>, config: LinkConfig) -> Self {
        let flags = DueFlags::new();
        // First tick should ping and clock-sync right away rather than wait
        // a full interval.
        flags.raise_ping();
        flags.raise_time_sync();
        let flags = Arc::new(flags);

        let conn = Connection::new(provider, config.clone());
        // Every (re)connect queues a push of the stored snapshot, so the
        // display never sits blank waiting for the payload to change.
        let connect_flags = flags.clone();
        conn.on_connected(move || connect_flags.raise_routing_update());

        Self {
            conn,
            flags,
            snapshot: Arc::new(RoutingSnapshot::new()),
            config,
        }
    }

    /// Spawns the scheduler tick plus the keepalive and clock-sync flag
    /// timers. The timers only raise flags; the tick is the sole consumer.
    pub fn start(&self) {
        let scheduler = Scheduler::new(
            self.conn.clone(),
            self.flags.clone(),
            self.snapshot.clone(),
            self.config.clone(),
        );
        tokio::spawn(scheduler.run());

        let ping_flags = self.flags.clone();
        spawn_flag_timer(self.conn.clone(), self.config.ping_interval, move || {
            ping_flags.raise_ping()
        });

        let sync_flags = self.flags.clone();
        spawn_flag_timer(self.conn.clone(), self.config.time_sync_interval, move || {
            sync_flags.raise_time_sync()
        });
    }

    /// Queues a routing-info push for the next eligible tick.
    ///
    /// A payload identical to the last submission is dropped unless
    /// always-send mode is on. A non-empty new payload replaces the stored
    /// snapshot; an empty one only raises the flag.
    pub fn schedule_update(&self, payload: &str) {
        if self.snapshot.submit(payload) || self.config.always_send {
            self.flags.raise_routing_update();
        }
    }

    /// True while a routing update waits for its tick.
    pub fn update_pending(&self) -> bool {
        self.flags.routing_update_pending()
    }

    /// Forces a connection check now instead of waiting for the next
    /// keepalive interval. Returns true iff a live socket exists afterwards.
    pub async fn connect(&self) -> bool {
        self.conn.ensure_connected().await
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.is_connected().await
    }

    /// Stops the background tasks and closes the socket. Idempotent.
    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// The underlying connection (for diagnostics and tests).
    pub fn connection(&self) -> Connection {
        self.conn.clone()
    }
}

/// Periodic task that raises one due-flag until the connection is stopped.
/// First fire comes one period after start, like the original timers.
fn spawn_flag_timer(conn: Connection, period: Duration, raise: impl Fn() + Send + 'static) {
    tokio::spawn(async move {
        let mut timer = interval_at(Instant::now() + period, period);
        loop {
            timer.tick().await;
            if conn.is_stopped() {
                break;
            }
            raise();
        }
    });
}
