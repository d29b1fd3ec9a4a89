//! End-to-end tests over real localhost sockets.

use navlink_client::{
    ClientError, Connection, DisplayLinkClient, DueFlags, Endpoint, LinkConfig, RoutingSnapshot,
    Scheduler, SharedConfig,
};
use navlink_protocol::{Command, Decoder, Frame};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_test::assert_ok;

fn fast_link() -> LinkConfig {
    LinkConfig::default()
        .with_connect_timeout(Duration::from_millis(500))
        .with_reply_timeout(Duration::from_millis(200))
}

fn connection_to(port: u16) -> (Arc<SharedConfig>, Connection) {
    let provider = Arc::new(SharedConfig::new(Endpoint::new("127.0.0.1", port)));
    let conn = Connection::new(provider.clone(), fast_link());
    (provider, conn)
}

fn scheduler_for(conn: &Connection) -> (Arc<DueFlags>, Arc<RoutingSnapshot>, Scheduler) {
    let flags = Arc::new(DueFlags::new());
    let snapshot = Arc::new(RoutingSnapshot::new());
    let scheduler = Scheduler::new(conn.clone(), flags.clone(), snapshot.clone(), fast_link());
    (flags, snapshot, scheduler)
}

async fn read_one_frame(stream: &mut TcpStream) -> Frame {
    let mut decoder = Decoder::new();
    loop {
        if let Some(frame) = decoder.decode_frame().unwrap() {
            return frame;
        }
        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "peer closed before a full frame arrived");
        decoder.extend(&buf[..n]);
    }
}

#[tokio::test]
async fn routing_update_bytes_on_the_wire() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (_provider, conn) = connection_to(port);
    let (flags, snapshot, scheduler) = scheduler_for(&conn);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut bytes = vec![0u8; 64];
        let mut filled = 0;
        // Payload is 16 chars, so the whole frame is 20 bytes
        while filled < 20 {
            let n = stream.read(&mut bytes[filled..]).await.unwrap();
            assert!(n > 0);
            filled += n;
        }
        bytes.truncate(filled);
        (bytes, stream)
    });

    assert!(conn.ensure_connected().await);
    snapshot.submit(r#"{"cDist":"100m"}"#);
    flags.raise_routing_update();
    scheduler.tick().await;

    let (bytes, _stream) = server.await.unwrap();
    let mut expected = vec![0x80u8, 0x14, 0x10];
    expected.extend_from_slice(br#"{"cDist":"100m"}"#);
    expected.push(0x00);
    assert_eq!(bytes, expected);
    assert!(!flags.routing_update_pending());
}

#[tokio::test]
async fn ping_pong_keeps_the_link() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (_provider, conn) = connection_to(port);
    let (flags, _snapshot, scheduler) = scheduler_for(&conn);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let frame = read_one_frame(&mut stream).await;
        assert_eq!(frame.command, Command::Ping);
        stream
            .write_all(&Frame::pong().encode().unwrap())
            .await
            .unwrap();
        stream
    });

    flags.raise_ping();
    scheduler.tick().await;

    assert!(conn.is_connected().await);
    assert!(!flags.ping_pending());
    drop(server.await.unwrap());
}

#[tokio::test]
async fn silent_peer_drops_the_link() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (_provider, conn) = connection_to(port);
    let (flags, _snapshot, scheduler) = scheduler_for(&conn);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Swallow the ping, never answer; wait for the client to give up
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink).await;
    });

    flags.raise_ping();
    scheduler.tick().await;

    assert!(!conn.is_connected().await);
    server.await.unwrap();
}

#[tokio::test]
async fn non_pong_reply_drops_the_link() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (_provider, conn) = connection_to(port);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let frame = read_one_frame(&mut stream).await;
        assert_eq!(frame.command, Command::Ping);
        // Echo a PING back instead of the expected PONG
        stream
            .write_all(&Frame::ping().encode().unwrap())
            .await
            .unwrap();
        stream
    });

    assert!(conn.ensure_connected().await);
    let result = conn.ping().await;
    assert!(matches!(
        result,
        Err(ClientError::UnexpectedReply(Command::Ping))
    ));
    assert!(!conn.is_connected().await);
    drop(server.await.unwrap());
}

#[tokio::test]
async fn ping_outranks_routing_update() {
    // Bind, note the port, drop the listener: dials get refused fast
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (_provider, conn) = connection_to(port);
    let (flags, snapshot, scheduler) = scheduler_for(&conn);

    snapshot.submit(r#"{"cDist":"100m"}"#);
    flags.raise_ping();
    flags.raise_routing_update();
    scheduler.tick().await;

    // The tick went to the (failed) ping; the routing update is untouched
    // and must survive for the next tick.
    assert!(!flags.ping_pending());
    assert!(flags.routing_update_pending());
    assert!(!conn.is_connected().await);
}

#[tokio::test]
async fn no_socket_no_ping_means_no_io() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (_provider, conn) = connection_to(port);
    let (flags, snapshot, scheduler) = scheduler_for(&conn);

    snapshot.submit(r#"{"cDist":"100m"}"#);
    flags.raise_routing_update();
    scheduler.tick().await;

    // Routing updates only flow over an existing socket; the flag stays
    // raised until the keepalive path has rebuilt one.
    assert!(flags.routing_update_pending());
}

#[tokio::test]
async fn overlapping_connects_dial_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (_provider, conn) = connection_to(port);

    let first = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.ensure_connected().await })
    };
    let second = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.ensure_connected().await })
    };
    assert!(first.await.unwrap());
    assert!(second.await.unwrap());

    // Exactly one dial must have reached the listener
    let (_stream, _) = listener.accept().await.unwrap();
    let extra = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(extra.is_err(), "a second dial reached the listener");
}

#[tokio::test]
async fn endpoint_change_rebuilds_the_connection() {
    let old_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let new_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let old_port = old_listener.local_addr().unwrap().port();
    let new_port = new_listener.local_addr().unwrap().port();

    let (provider, conn) = connection_to(old_port);
    assert!(conn.ensure_connected().await);
    let (mut old_stream, _) = old_listener.accept().await.unwrap();

    // Settings change under the live socket
    provider.set_endpoint(Endpoint::new("127.0.0.1", new_port));
    assert!(conn.ensure_connected().await);

    // The old peer sees the teardown, the new one gets the dial
    let (mut new_stream, _) = new_listener.accept().await.unwrap();
    let mut buf = [0u8; 8];
    let n = old_stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "old socket should have been shut down");

    // The next send goes to the new endpoint
    assert_ok!(conn.send_frame(&Frame::update_time(1234)).await);
    let frame = read_one_frame(&mut new_stream).await;
    assert_eq!(frame.command, Command::UpdateTime);
    assert_eq!(&frame.payload[..], b"1234");
}

#[tokio::test]
async fn reconnect_repushes_routing_snapshot() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (_provider, conn) = connection_to(port);
    let (flags, snapshot, _scheduler) = scheduler_for(&conn);
    let hook_flags = flags.clone();
    conn.on_connected(move || hook_flags.raise_routing_update());

    snapshot.submit(r#"{"cDist":"100m"}"#);
    assert!(flags.take_routing_update());

    assert!(conn.ensure_connected().await);
    let (stream, _) = listener.accept().await.unwrap();
    assert!(
        flags.take_routing_update(),
        "a fresh connection must queue a snapshot push"
    );

    // Peer goes away; the next keepalive notices and the redial queues the
    // snapshot again.
    drop(stream);
    assert!(conn.ping().await.is_err());
    assert!(!conn.is_connected().await);

    assert!(conn.ensure_connected().await);
    let (_stream, _) = listener.accept().await.unwrap();
    assert!(
        flags.routing_update_pending(),
        "a rebuilt connection must queue a snapshot push"
    );
}

#[tokio::test]
async fn facade_connect_queues_snapshot_push() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let provider = Arc::new(SharedConfig::new(Endpoint::new("127.0.0.1", port)));
    let client = DisplayLinkClient::new(provider, fast_link());

    assert!(!client.update_pending());
    assert!(client.connect().await);
    let _accepted = listener.accept().await.unwrap();
    assert!(client.update_pending());
}

#[tokio::test]
async fn clock_sync_sends_decimal_millis() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (_provider, conn) = connection_to(port);
    let (flags, _snapshot, scheduler) = scheduler_for(&conn);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let frame = read_one_frame(&mut stream).await;
        (frame, stream)
    });

    assert!(conn.ensure_connected().await);
    flags.raise_time_sync();
    scheduler.tick().await;

    let (frame, _stream) = server.await.unwrap();
    assert_eq!(frame.command, Command::UpdateTime);
    let text = std::str::from_utf8(&frame.payload).unwrap();
    let millis: u64 = text.parse().expect("payload must be decimal ASCII");
    assert!(millis < 86_401_000);
    assert!(!flags.time_sync_pending());
}

#[tokio::test]
async fn close_stops_reconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (_provider, conn) = connection_to(port);

    assert!(conn.ensure_connected().await);
    conn.close().await;

    assert!(!conn.is_connected().await);
    assert!(!conn.ensure_connected().await);
}
