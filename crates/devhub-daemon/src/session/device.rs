//! Remote device sessions.
//!
//! A device opens a persistent connection, identifies itself with one
//! `HELLO <unique-identifier>` line, and is then registered with the device
//! registry.  The registered [`DeviceSession`] is what the registry evicts:
//! its `stop`/`close_socket` operations signal the serving loop, which owns
//! the transport and drops it on exit.
//!
//! A session does **not** deregister itself when the device disconnects.  It
//! only marks itself inactive; the stale entry is reaped by the registry's
//! liveness-checked lookup, by a duplicate registration, or by shutdown.
//! This keeps deregistration in exactly one place (the registry) and means
//! eviction and natural termination can race freely: the shutdown signal is
//! a permit, not an edge, and double delivery is harmless.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use async_trait::async_trait;
use devhub_core::Device;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::server::DaemonServer;
use crate::session::Session;

/// Handler for one inbound device connection.
///
/// Performs the identification handshake, registers the resulting
/// [`DeviceSession`], and then serves the connection until the device
/// disconnects or the session is evicted.
pub struct DeviceHandler {
    server: Arc<DaemonServer>,
    peer: SocketAddr,
    conn_id: Uuid,
}

impl DeviceHandler {
    pub fn new(server: Arc<DaemonServer>, peer: SocketAddr, conn_id: Uuid) -> Self {
        Self {
            server,
            peer,
            conn_id,
        }
    }

    /// Handshake + register + serve, over any transport (unit tests use an
    /// in-memory mock stream).
    async fn handle<S>(&self, stream: S) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut lines = BufReader::new(read_half).lines();

        // The very first line must identify the device.  A peer that
        // disconnects or sends anything else aborts only this connection.
        let greeting = lines
            .next_line()
            .await
            .context("reading device identification")?
            .context("device disconnected before identifying")?;
        let identifier = parse_hello(&greeting)?;

        let session = Arc::new(DeviceSession::new(identifier, self.peer, self.conn_id));
        self.server.add_device(Arc::clone(&session) as Arc<dyn Device>);
        session.serve(lines, write_half).await
    }
}

#[async_trait]
impl Session for DeviceHandler {
    fn kind(&self) -> &'static str {
        "device"
    }

    async fn run(self: Arc<Self>, stream: TcpStream) -> anyhow::Result<()> {
        self.handle(stream).await
    }
}

/// Parses the `HELLO <unique-identifier>` greeting line.
fn parse_hello(line: &str) -> anyhow::Result<String> {
    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("HELLO"), Some(id), None) => Ok(id.to_owned()),
        _ => bail!("invalid device greeting: {line:?}"),
    }
}

/// A registered device session: the registry-facing half of a device
/// connection.
///
/// The serving loop owns the transport; `stop`/`close_socket` only raise the
/// shutdown signal, which makes both trivially idempotent and safe to call
/// after the loop already finished.
pub struct DeviceSession {
    identifier: String,
    peer: SocketAddr,
    conn_id: Uuid,
    connected_at: Instant,
    /// True while the transport is usable; cleared when the serve loop exits.
    active: AtomicBool,
    /// One-way stop request flag.
    stopped: AtomicBool,
    /// Wakes the serve loop on stop/close.  `notify_one` stores a permit, so
    /// a signal raised before the loop reaches its `select!` is not lost.
    shutdown: Notify,
}

impl DeviceSession {
    pub fn new(identifier: String, peer: SocketAddr, conn_id: Uuid) -> Self {
        Self {
            identifier,
            peer,
            conn_id,
            connected_at: Instant::now(),
            active: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Serves the device's line protocol until EOF, an I/O error, or the
    /// shutdown signal.  Marks the session inactive on every exit path.
    async fn serve<R, W>(
        self: Arc<Self>,
        mut lines: Lines<BufReader<ReadHalf<R>>>,
        mut write_half: WriteHalf<W>,
    ) -> anyhow::Result<()>
    where
        R: AsyncRead + Send,
        W: AsyncWrite + Send,
    {
        let result = self.serve_inner(&mut lines, &mut write_half).await;
        self.active.store(false, Ordering::SeqCst);
        debug!(
            identifier = %self.identifier,
            peer = %self.peer,
            conn_id = %self.conn_id,
            "device session finished"
        );
        result
    }

    async fn serve_inner<R, W>(
        &self,
        lines: &mut Lines<BufReader<ReadHalf<R>>>,
        write_half: &mut WriteHalf<W>,
    ) -> anyhow::Result<()>
    where
        R: AsyncRead + Send,
        W: AsyncWrite + Send,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    debug!(identifier = %self.identifier, "device session stop requested");
                    return Ok(());
                }
                line = lines.next_line() => match line? {
                    Some(request) if request.trim() == "PING" => {
                        write_half.write_all(b"PONG\n").await?;
                    }
                    Some(other) => {
                        // Unknown traffic is tolerated; the device protocol
                        // may grow without breaking older daemons.
                        debug!(identifier = %self.identifier, line = %other, "ignoring device line");
                    }
                    // EOF: the device hung up.
                    None => return Ok(()),
                },
            }
        }
    }
}

impl Device for DeviceSession {
    fn unique_identifier(&self) -> &str {
        &self.identifier
    }

    fn connected_at(&self) -> Instant {
        self.connected_at
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    fn close_socket(&self) -> std::io::Result<()> {
        // The serve loop owns the stream and drops it when it observes the
        // signal; a session that already terminated simply leaves the permit
        // unconsumed.
        self.shutdown.notify_one();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
