//! Per-connection session handlers.
//!
//! Every accepted connection runs on its own Tokio task.  A session is a
//! plain type with an async `run` entry point; it *holds* the server handle
//! and transport it needs instead of being a thread subclass.  The accept
//! loop builds the right session for the connection's classification and
//! hands it to [`spawn`].
//!
//! - [`ScriptSession`] – local control connections; answers line-oriented
//!   commands against the server's registry accessors.
//! - [`DeviceHandler`] / [`DeviceSession`] – remote device connections; the
//!   handler performs the identification handshake and registers a
//!   [`DeviceSession`] with the registry, then serves the connection.

mod device;
mod script;

pub use device::{DeviceHandler, DeviceSession};
pub use script::ScriptSession;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{info, warn};
use uuid::Uuid;

/// A connection handler with its own scheduling context.
#[async_trait]
pub trait Session: Send + Sync {
    /// Short label for log lines ("script", "device").
    fn kind(&self) -> &'static str;

    /// Serves the connection to completion.
    ///
    /// # Errors
    ///
    /// Any error is isolated to this connection; the caller logs it and the
    /// accept loop is unaffected.
    async fn run(self: Arc<Self>, stream: TcpStream) -> anyhow::Result<()>;
}

/// Spawns a session onto its own task and logs the outcome.
///
/// The outer spawn/log wrapper keeps `?`-style propagation available inside
/// each session's `run` while guaranteeing a per-connection failure never
/// reaches the accept loop.
pub fn spawn(session: Arc<dyn Session>, stream: TcpStream, peer: SocketAddr, conn_id: Uuid) {
    tokio::spawn(async move {
        let kind = session.kind();
        match session.run(stream).await {
            Ok(()) => info!(%peer, %conn_id, "{kind} session closed"),
            Err(e) => warn!(%peer, %conn_id, "{kind} session ended with error: {e:#}"),
        }
    });
}
