//! Cooperative scheduler: one outbound action per tick, fixed priority.

use crate::config::LinkConfig;
use crate::connection::Connection;
use chrono::Timelike;
use navlink_protocol::Frame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval_at, Instant};

/// Pending-action flags shared between the flag timers, the producer and the
/// tick.
///
/// Raising happens from whichever task notices a deadline or a new payload;
/// clearing happens with an atomic swap inside the tick, so a flag raised
/// concurrently with a clear lands on the next tick instead of getting lost.
#[derive(Debug, Default)]
pub struct DueFlags {
    ping: AtomicBool,
    time_sync: AtomicBool,
    routing_update: AtomicBool,
}

impl DueFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise_ping(&self) {
        self.ping.store(true, Ordering::SeqCst);
    }

    pub fn raise_time_sync(&self) {
        self.time_sync.store(true, Ordering::SeqCst);
    }

    pub fn raise_routing_update(&self) {
        self.routing_update.store(true, Ordering::SeqCst);
    }

    /// Clears and returns the ping flag in one step.
    pub fn take_ping(&self) -> bool {
        self.ping.swap(false, Ordering::SeqCst)
    }

    pub fn take_time_sync(&self) -> bool {
        self.time_sync.swap(false, Ordering::SeqCst)
    }

    pub fn take_routing_update(&self) -> bool {
        self.routing_update.swap(false, Ordering::SeqCst)
    }

    pub fn ping_pending(&self) -> bool {
        self.ping.load(Ordering::SeqCst)
    }

    pub fn time_sync_pending(&self) -> bool {
        self.time_sync.load(Ordering::SeqCst)
    }

    pub fn routing_update_pending(&self) -> bool {
        self.routing_update.load(Ordering::SeqCst)
    }
}

/// Last routing payload handed over by the producer.
///
/// Shared between the producer calls and the tick; the lock covers the
/// compare-and-replace so a racing submit cannot tear the snapshot.
#[derive(Debug, Default)]
pub struct RoutingSnapshot {
    inner: Mutex<String>,
}

impl RoutingSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new payload. Returns false when it matches the last
    /// submission (redundant, nothing to push). An empty payload never
    /// replaces the stored snapshot but still counts as a change.
    pub fn submit(&self, payload: &str) -> bool {
        let mut current = self.inner.lock();
        if current.as_str() == payload {
            return false;
        }
        if !payload.is_empty() {
            *current = payload.to_owned();
        }
        true
    }

    pub fn current(&self) -> String {
        self.inner.lock().clone()
    }
}

/// Decides which single outbound action a tick performs.
pub struct Scheduler {
    conn: Connection,
    flags: Arc<DueFlags>,
    snapshot: Arc<RoutingSnapshot>,
    config: LinkConfig,
}

impl Scheduler {
    pub fn new(
        conn: Connection,
        flags: Arc<DueFlags>,
        snapshot: Arc<RoutingSnapshot>,
        config: LinkConfig,
    ) -> Self {
        Self {
            conn,
            flags,
            snapshot,
            config,
        }
    }

    /// One tick: at most one outbound action, in fixed priority order:
    /// keepalive, then clock sync, then routing update. A tick with no
    /// socket and no ping due performs no I/O and consumes no other flag.
    pub async fn tick(&self) {
        if self.flags.take_ping() {
            if !self.conn.ensure_connected().await {
                tracing::warn!("keepalive: no link to the external display (wrong address or network down?)");
                return;
            }
            match self.conn.ping().await {
                Ok(rtt) => {
                    tracing::debug!(rtt_ms = rtt.as_secs_f64() * 1000.0, "pong received");
                }
                Err(e) => tracing::debug!(error = %e, "keepalive failed"),
            }
            return;
        }

        if !self.conn.is_connected().await {
            return;
        }

        if self.flags.take_time_sync() {
            let frame = Frame::update_time(millis_since_midnight());
            if let Err(e) = self.conn.send_frame(&frame).await {
                tracing::debug!(error = %e, "clock sync send failed");
            }
        } else if self.flags.take_routing_update() || self.config.always_send {
            match Frame::update_routing_info(&self.snapshot.current()) {
                Ok(frame) => {
                    if let Err(e) = self.conn.send_frame(&frame).await {
                        tracing::debug!(error = %e, "routing update send failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "routing payload not encodable, dropped"),
            }
        }
    }

    /// Ticks until the connection is stopped. First tick fires one interval
    /// after start, matching the original timer cadence.
    pub async fn run(self) {
        let period = self.config.tick_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if self.conn.is_stopped() {
                break;
            }
            self.tick().await;
        }
    }
}

/// Milliseconds elapsed since local midnight, the UPDATE_TIME payload.
fn millis_since_midnight() -> u64 {
    let now = chrono::Local::now();
    u64::from(now.num_seconds_from_midnight()) * 1000 + u64::from(now.timestamp_subsec_millis())
}
