//! Connection lifecycle: dial, validate against the configuration, tear down.

use crate::config::{ConfigProvider, Endpoint, LinkConfig};
use crate::error::ClientError;
use navlink_protocol::{Command, Decoder, Frame};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// A live socket bundled with the endpoint it was dialed against and the
/// decode buffer for its inbound bytes. Dropped as one unit so stale bytes
/// never leak into a rebuilt connection.
struct Link {
    stream: TcpStream,
    endpoint: Endpoint,
    decoder: Decoder,
}

impl Link {
    fn new(stream: TcpStream, endpoint: Endpoint) -> Self {
        Self {
            stream,
            endpoint,
            decoder: Decoder::new(),
        }
    }
}

/// Owns the socket to the external display.
///
/// At most one socket exists at a time, and at most one connection attempt is
/// ever in flight; overlapping callers wait for the outstanding attempt
/// instead of dialing again. No raw socket handle escapes this type. Cloning
/// is cheap and shares the same underlying state.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn ConfigProvider>,
    config: LinkConfig,
    link: Mutex<Option<Link>>,
    /// True while a dial task runs; doubles as the waiters' wakeup signal.
    connecting: watch::Sender<bool>,
    /// Fired after every successful dial, with no locks held.
    connected_hook: SyncMutex<Option<Box<dyn Fn() + Send + Sync>>>,
    stopped: AtomicBool,
}

impl Connection {
    pub fn new(provider: Arc<dyn ConfigProvider>, config: LinkConfig) -> Self {
        let (connecting, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                provider,
                config,
                link: Mutex::new(None),
                connecting,
                connected_hook: SyncMutex::new(None),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Registers a callback fired after every successful dial.
    ///
    /// The client uses this to queue a routing snapshot push, so a freshly
    /// (re)connected display gets the current state instead of staying blank
    /// until the payload next changes.
    pub fn on_connected(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.inner.connected_hook.lock() = Some(Box::new(hook));
    }

    /// Makes sure a live, correctly-addressed socket exists.
    ///
    /// Discards a socket the transport reports dead or whose endpoint no
    /// longer matches the current configuration, then dials if nothing is
    /// left. The wait is bounded by the connect timeout either way. Returns
    /// true iff a socket exists afterwards.
    pub async fn ensure_connected(&self) -> bool {
        if self.is_stopped() {
            return false;
        }

        let want = self.inner.provider.endpoint();
        {
            let mut guard = self.inner.link.lock().await;
            if let Some(link) = guard.as_ref() {
                if link.stream.peer_addr().is_err() {
                    tracing::debug!("socket reports no peer, discarding");
                    *guard = None;
                }
            }
            if let Some(link) = guard.as_ref() {
                if link.endpoint != want {
                    tracing::debug!(
                        old = %link.endpoint,
                        new = %want,
                        "display endpoint changed, discarding socket"
                    );
                    if let Some(mut stale) = guard.take() {
                        let _ = stale.stream.shutdown().await;
                    }
                }
            }
            if guard.is_some() {
                return true;
            }
        }

        let started = self.inner.connecting.send_if_modified(|in_flight| {
            if *in_flight {
                false
            } else {
                *in_flight = true;
                true
            }
        });
        if started {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.dial(want).await;
                inner.connecting.send_replace(false);
            });
        }

        let mut rx = self.inner.connecting.subscribe();
        let _ = tokio::time::timeout(
            self.inner.config.connect_timeout,
            rx.wait_for(|in_flight| !*in_flight),
        )
        .await;

        self.inner.link.lock().await.is_some()
    }

    /// Writes one frame. An I/O failure discards the socket.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        let encoded = frame.encode()?;
        let mut guard = self.inner.link.lock().await;
        let link = guard.as_mut().ok_or(ClientError::NotConnected)?;
        let result = async {
            link.stream.write_all(&encoded).await?;
            link.stream.flush().await
        }
        .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "write failed, discarding socket");
            *guard = None;
            return Err(ClientError::Io(e));
        }
        Ok(())
    }

    /// Reads one frame, bounded by the reply timeout.
    ///
    /// Timeout, EOF and I/O or framing errors all discard the socket; the
    /// next keepalive interval rebuilds it.
    pub async fn read_frame(&self) -> Result<Frame, ClientError> {
        let mut guard = self.inner.link.lock().await;
        let link = guard.as_mut().ok_or(ClientError::NotConnected)?;

        match tokio::time::timeout(self.inner.config.reply_timeout, read_from(link)).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "read failed, discarding socket");
                *guard = None;
                Err(e)
            }
            Err(_) => {
                tracing::debug!("no frame within the reply deadline, discarding socket");
                *guard = None;
                Err(ClientError::Timeout)
            }
        }
    }

    /// Keepalive round trip: PING out, one frame back, must be PONG.
    ///
    /// Returns the measured round-trip time. Any failure, including a reply
    /// that is not PONG, discards the socket.
    pub async fn ping(&self) -> Result<Duration, ClientError> {
        let started = Instant::now();
        self.send_frame(&Frame::ping()).await?;
        let reply = self.read_frame().await?;
        if reply.command != Command::Pong {
            tracing::debug!(reply = %reply.command, "expected PONG, discarding socket");
            self.drop_link().await;
            return Err(ClientError::UnexpectedReply(reply.command));
        }
        Ok(started.elapsed())
    }

    async fn drop_link(&self) {
        if let Some(mut link) = self.inner.link.lock().await.take() {
            let _ = link.stream.shutdown().await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.link.lock().await.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stops the client for good: timers observe the flag and exit, the
    /// socket is shut down. Safe to call more than once.
    ///
    /// An in-flight read holds the link mutex, so teardown may wait up to
    /// the reply timeout for it to finish.
    pub async fn close(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.drop_link().await;
        tracing::debug!("display link closed");
    }
}

impl Inner {
    /// One connection attempt, bounded by the connect timeout.
    async fn dial(&self, endpoint: Endpoint) {
        tracing::debug!(%endpoint, "connecting to external display");
        let attempt = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(mut stream)) => {
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                stream.set_nodelay(true).ok();
                let mut guard = self.link.lock().await;
                if guard.is_some() {
                    // A live link appeared while this dial was in flight;
                    // keep it and throw the new socket away.
                    tracing::debug!(%endpoint, "link already present, dropping redundant dial");
                    drop(guard);
                    let _ = stream.shutdown().await;
                    return;
                }
                tracing::debug!(%endpoint, "connected");
                *guard = Some(Link::new(stream, endpoint));
                drop(guard);
                if let Some(hook) = self.connected_hook.lock().as_ref() {
                    hook();
                }
            }
            Ok(Err(e)) => tracing::debug!(%endpoint, error = %e, "connect failed"),
            Err(_) => tracing::debug!(%endpoint, "connect attempt timed out"),
        }
    }
}

async fn read_from(link: &mut Link) -> Result<Frame, ClientError> {
    loop {
        if let Some(frame) = link.decoder.decode_frame()? {
            return Ok(frame);
        }
        let mut buf = [0u8; 256];
        let n = link.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        link.decoder.extend(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SharedConfig;

    fn test_connection() -> Connection {
        let provider = Arc::new(SharedConfig::new(Endpoint::new("127.0.0.1", 1)));
        Connection::new(provider, LinkConfig::default())
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let conn = test_connection();
        assert!(!conn.is_connected().await);
        assert!(!conn.is_stopped());
    }

    #[tokio::test]
    async fn test_send_without_socket() {
        let conn = test_connection();
        let result = conn.send_frame(&Frame::ping()).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_read_without_socket() {
        let conn = test_connection();
        let result = conn.read_frame().await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_redundant_dial_keeps_existing_link() {
        let first_peer = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second_peer = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let provider = Arc::new(SharedConfig::new(Endpoint::new(
            "127.0.0.1",
            first_peer.local_addr().unwrap().port(),
        )));
        let conn = Connection::new(provider, LinkConfig::default());

        assert!(conn.ensure_connected().await);
        let (mut first, _) = first_peer.accept().await.unwrap();

        // A dial that finishes after a link is already up must not replace it
        let late = Endpoint::new("127.0.0.1", second_peer.local_addr().unwrap().port());
        conn.inner.dial(late).await;
        let (mut second, _) = second_peer.accept().await.unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(second.read(&mut buf).await.unwrap(), 0);

        // The healthy link still carries traffic
        conn.send_frame(&Frame::ping()).await.unwrap();
        assert!(first.read(&mut buf).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = test_connection();
        conn.close().await;
        conn.close().await;
        assert!(conn.is_stopped());
        assert!(!conn.ensure_connected().await);
    }
}
