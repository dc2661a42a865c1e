//! End-to-end tests for the daemon over real loopback sockets.
//!
//! Each test starts a [`DaemonServer`] on an ephemeral port (`port = 0`) and
//! drives it exactly like a peer would: a script speaks the line command
//! protocol, a device identifies itself with `HELLO <id>` and stays
//! connected.  `local_address` is pinned to `127.0.0.1` so classification is
//! deterministic regardless of the host's interfaces:
//!
//! - `all_remote_connections = false` → loopback peers take the script path.
//! - `all_remote_connections = true`  → every peer takes the device path.
//!
//! Registration and eviction happen on other tasks, so assertions about the
//! registry poll with a deadline instead of assuming an ordering.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::{sleep, timeout};

use devhub_daemon::config::DaemonConfig;
use devhub_daemon::server::DaemonServer;

// ── Harness ───────────────────────────────────────────────────────────────────

const DEADLINE: Duration = Duration::from_secs(5);

/// Starts a daemon on an ephemeral loopback port and waits until it listens.
async fn start_daemon(all_remote_connections: bool) -> (Arc<DaemonServer>, std::net::SocketAddr) {
    let config = DaemonConfig {
        port: 0,
        bind_address: "127.0.0.1".parse().unwrap(),
        all_remote_connections,
        local_address: Some("127.0.0.1".parse().unwrap()),
        ..DaemonConfig::default()
    };
    let server = Arc::new(DaemonServer::new(config));
    tokio::spawn(Arc::clone(&server).run());

    let addr = wait_for(|| server.listen_addr())
        .await
        .expect("daemon must start listening");
    (server, addr)
}

/// Polls `probe` until it yields `Some` or the deadline expires.
async fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    timeout(DEADLINE, async {
        loop {
            if let Some(value) = probe() {
                return value;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .ok()
}

/// Connects and returns buffered reader + raw writer halves.
async fn connect(addr: std::net::SocketAddr) -> (BufReader<OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) {
    let stream = TcpStream::connect(addr).await.expect("connect to daemon");
    let (read_half, write_half) = stream.into_split();
    (BufReader::new(read_half), write_half)
}

async fn send_line(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    line: &str,
) {
    writer
        .write_all(format!("{line}\n").as_bytes())
        .await
        .expect("write line");
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Option<String> {
    let mut line = String::new();
    let n = timeout(DEADLINE, reader.read_line(&mut line))
        .await
        .expect("read within deadline")
        .expect("read line");
    if n == 0 {
        None
    } else {
        Some(line.trim_end().to_string())
    }
}

// ── Script path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_loopback_connection_takes_script_path_and_registry_is_unaffected() {
    let (server, addr) = start_daemon(false).await;
    let (mut reader, mut writer) = connect(addr).await;

    send_line(&mut writer, "COUNT").await;
    assert_eq!(read_line(&mut reader).await.as_deref(), Some("0"));

    send_line(&mut writer, "STATUS ghost").await;
    assert_eq!(read_line(&mut reader).await.as_deref(), Some("offline"));

    send_line(&mut writer, "UPTIME").await;
    let uptime = read_line(&mut reader).await.expect("uptime reply");
    uptime.parse::<u64>().expect("uptime is whole seconds");

    send_line(&mut writer, "FROBNICATE").await;
    assert_eq!(
        read_line(&mut reader).await.as_deref(),
        Some("err unknown command")
    );

    assert_eq!(server.device_count(), 0);
    server.stop();
}

// ── Device path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_device_registers_and_answers_ping() {
    let (server, addr) = start_daemon(true).await;
    let (mut reader, mut writer) = connect(addr).await;

    send_line(&mut writer, "HELLO alpha").await;
    wait_for(|| (server.device_count() == 1).then_some(()))
        .await
        .expect("device registers");
    assert!(server.get_device("alpha").is_some());

    send_line(&mut writer, "PING").await;
    assert_eq!(read_line(&mut reader).await.as_deref(), Some("PONG"));

    server.stop();
}

#[tokio::test]
async fn test_duplicate_identifier_evicts_previous_session() {
    let (server, addr) = start_daemon(true).await;

    let (mut old_reader, mut old_writer) = connect(addr).await;
    send_line(&mut old_writer, "HELLO alpha").await;
    wait_for(|| (server.device_count() == 1).then_some(()))
        .await
        .expect("first session registers");

    let (mut new_reader, mut new_writer) = connect(addr).await;
    send_line(&mut new_writer, "HELLO alpha").await;

    // The old session is evicted: its connection gets closed under it.
    assert_eq!(read_line(&mut old_reader).await, None, "old session sees EOF");
    assert_eq!(server.device_count(), 1, "one entry per identifier");

    // The surviving session is the new one.
    send_line(&mut new_writer, "PING").await;
    assert_eq!(read_line(&mut new_reader).await.as_deref(), Some("PONG"));

    server.stop();
}

#[tokio::test]
async fn test_disconnected_device_is_reaped_by_lookup() {
    let (server, addr) = start_daemon(true).await;

    let (_reader, mut writer) = connect(addr).await;
    send_line(&mut writer, "HELLO beta").await;
    wait_for(|| (server.device_count() == 1).then_some(()))
        .await
        .expect("device registers");

    // Device hangs up; the entry lingers until a lookup notices.
    drop(writer);
    drop(_reader);
    wait_for(|| server.get_device("beta").is_none().then_some(()))
        .await
        .expect("stale entry reaped by liveness-checked lookup");
    assert_eq!(server.device_count(), 0);

    server.stop();
}

#[tokio::test]
async fn test_malformed_greeting_never_registers() {
    let (server, addr) = start_daemon(true).await;
    let (mut reader, mut writer) = connect(addr).await;

    send_line(&mut writer, "HOWDY alpha").await;
    // The daemon aborts only this connection.
    assert_eq!(read_line(&mut reader).await, None);
    assert_eq!(server.device_count(), 0);

    // The accept loop is unaffected: the next device still registers.
    let (_r, mut w) = connect(addr).await;
    send_line(&mut w, "HELLO gamma").await;
    wait_for(|| (server.device_count() == 1).then_some(()))
        .await
        .expect("daemon still accepting devices");

    server.stop();
}

// ── Shutdown ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_drains_registry_and_closes_device_sessions() {
    let (server, addr) = start_daemon(true).await;

    let (mut reader_a, mut writer_a) = connect(addr).await;
    send_line(&mut writer_a, "HELLO a").await;
    let (mut reader_b, mut writer_b) = connect(addr).await;
    send_line(&mut writer_b, "HELLO b").await;
    wait_for(|| (server.device_count() == 2).then_some(()))
        .await
        .expect("both devices register");

    server.stop();

    assert_eq!(server.device_count(), 0);
    // Both evicted sessions release their transports.
    assert_eq!(read_line(&mut reader_a).await, None);
    assert_eq!(read_line(&mut reader_b).await, None);
}
