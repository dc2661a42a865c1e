//! The daemon server: accept loop and lifecycle.
//!
//! [`DaemonServer`] owns the listening socket, the stop flag, the start
//! timestamp, and the shared [`DeviceRegistry`].  Its accept loop classifies
//! every incoming connection (local script vs remote device) and hands each
//! one to a freshly spawned session task, so one slow peer never delays the
//! next accept.
//!
//! # Shutdown
//!
//! [`stop`](DaemonServer::stop) flips the one-way stop flag and drains the
//! registry.  The accept call is wrapped in a short timeout so the loop
//! observes the flag within [`ACCEPT_POLL_INTERVAL`] even while idle; once
//! the flag is down, an accept timeout or failure is the loop's normal
//! termination signal, not an error.  Dropping out of the loop releases the
//! listening socket.
//!
//! `stop()` only guarantees two things: the listener stops accepting, and
//! every *currently registered* device is evicted.  A connection that is
//! mid-handshake and not yet registered is not tracked and not cancelled.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use devhub_core::{classify, ConnectionKind, Device, DeviceRegistry};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::net::resolve_local_addr;
use crate::session::{self, DeviceHandler, ScriptSession, Session};

/// How long a single `accept()` may block before the loop re-checks the
/// stop flag.  Bounds shutdown latency while the daemon is idle.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Process exit code for unrecoverable startup failures.
pub const EXIT_STARTUP_FAILURE: i32 = 2;

/// Error type for fatal server startup failures.
///
/// Both variants indicate an unusable environment; the process terminates
/// with [`EXIT_STARTUP_FAILURE`] rather than retrying.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The daemon's own LAN address could not be determined, so peers can
    /// never be classified as local or remote.
    #[error("unable to determine local address: {source}")]
    AddressResolution {
        #[source]
        source: std::io::Error,
    },

    /// The configured port could not be bound.
    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// The connection daemon: accept loop, stop sequence, and the only access
/// points to the device registry.
pub struct DaemonServer {
    config: DaemonConfig,
    registry: DeviceRegistry,
    /// Set once at construction; read-only thereafter.
    started_at: Instant,
    /// One-way flag: `true` until `stop()`.
    running: AtomicBool,
    /// Actual bound address, available once `run()` has bound the listener.
    /// With `port = 0` in the config this is the only way to learn the port.
    listen_addr: OnceLock<SocketAddr>,
}

impl DaemonServer {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            registry: DeviceRegistry::new(),
            started_at: Instant::now(),
            running: AtomicBool::new(true),
            listen_addr: OnceLock::new(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Runs the accept loop until [`stop`](DaemonServer::stop) is called.
    ///
    /// Resolves the local address and binds the listener first; both are
    /// fatal when they fail.  After that, every failure is survivable: a
    /// transient accept error is logged and accepting resumes.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] only for the two fatal startup conditions.
    pub async fn run(self: Arc<Self>) -> Result<(), ServerError> {
        let local_addr = match self.config.local_address {
            Some(addr) => addr,
            None => resolve_local_addr()
                .map_err(|source| ServerError::AddressResolution { source })?,
        };

        let bind_addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr,
                source,
            })?;
        // With port 0 the OS picks the port; record what we actually got.
        let bound = listener.local_addr().unwrap_or(bind_addr);
        let _ = self.listen_addr.set(bound);
        info!(%bound, %local_addr, "daemon listening");

        while self.running.load(Ordering::Relaxed) {
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, peer))) => Self::dispatch(&self, stream, peer, local_addr),
                Ok(Err(e)) => {
                    if !self.running.load(Ordering::Relaxed) {
                        // The stop sequence is underway; a failing accept is
                        // the loop's normal termination signal.
                        break;
                    }
                    // Transient (e.g. EMFILE). One bad accept must not take
                    // the daemon down.
                    error!("accept failed: {e}");
                }
                Err(_) => {
                    // Timeout with no connection; loop back to check the flag.
                }
            }
        }

        info!("accept loop stopped");
        Ok(())
    }

    /// Classifies one accepted connection and spawns its session task.
    fn dispatch(
        server: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        local: IpAddr,
    ) {
        let conn_id = Uuid::new_v4();
        let kind = classify(peer.ip(), server.config.all_remote_connections, local);
        let session: Arc<dyn Session> = match kind {
            ConnectionKind::LocalScript => {
                info!(%peer, %conn_id, "new local script connection");
                Arc::new(ScriptSession::new(Arc::clone(server), conn_id))
            }
            ConnectionKind::RemoteDevice => {
                info!(%peer, %conn_id, "new device connection");
                Arc::new(DeviceHandler::new(Arc::clone(server), peer, conn_id))
            }
        };
        session::spawn(session, stream, peer, conn_id);
    }

    /// Stops the daemon: one-way flag flip, then registry drain.
    ///
    /// Safe to call before [`run`](DaemonServer::run) ever bound a socket and
    /// safe to call more than once; only the first call drains the registry.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("server shutting down");
            self.registry.remove_all();
        }
    }

    // ── Read-only accessors ───────────────────────────────────────────────────

    /// Instant the server was constructed.
    pub fn start_timestamp(&self) -> Instant {
        self.started_at
    }

    /// Time elapsed since the server was constructed.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Address the listener is bound to, once `run()` has bound it.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr.get().copied()
    }

    // ── Registry access points ────────────────────────────────────────────────
    //
    // Session handlers touch the registry only through these; the registry
    // itself stays private to the server.

    /// Number of currently registered devices (diagnostic snapshot).
    pub fn device_count(&self) -> usize {
        self.registry.count()
    }

    /// Liveness-checked lookup of a registered device.
    pub fn get_device(&self, identifier: &str) -> Option<Arc<dyn Device>> {
        self.registry.lookup(identifier)
    }

    /// Registers a device session, displacing any previous holder of the
    /// same identifier.  The caller runs the session's logic afterwards.
    pub fn add_device(&self, device: Arc<dyn Device>) {
        self.registry.insert(device);
    }

    /// Unconditionally evicts a device by identifier.
    pub fn remove_device(&self, identifier: &str) {
        self.registry.remove(identifier);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
