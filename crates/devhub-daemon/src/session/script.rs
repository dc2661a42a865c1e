//! Local script sessions.
//!
//! Scripts on this host connect to the daemon's port and speak a small
//! newline-delimited command protocol.  Each line gets exactly one reply
//! line; the session ends when the script closes its end.  Commands are the
//! leaf consumers of the registry: they only go through the server's
//! read-only accessors and never touch the map directly.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

use crate::server::DaemonServer;
use crate::session::Session;

/// One parsed script command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    /// `COUNT` – number of registered devices.
    Count,
    /// `STATUS <id>` – `online` / `offline` for one device (liveness-checked).
    Status(String),
    /// `DROP <id>` – evict a device unconditionally.
    Drop(String),
    /// `UPTIME` – whole seconds since the daemon started.
    Uptime,
}

impl ScriptCommand {
    /// Parses one request line.  Returns `None` for anything malformed.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next()?, words.next()) {
            ("COUNT", None) => Self::Count,
            ("UPTIME", None) => Self::Uptime,
            ("STATUS", Some(id)) => Self::Status(id.to_owned()),
            ("DROP", Some(id)) => Self::Drop(id.to_owned()),
            _ => return None,
        };
        // Trailing garbage invalidates the line.
        if words.next().is_some() {
            return None;
        }
        Some(command)
    }
}

/// One local script connection.
pub struct ScriptSession {
    server: Arc<DaemonServer>,
    conn_id: Uuid,
}

impl ScriptSession {
    pub fn new(server: Arc<DaemonServer>, conn_id: Uuid) -> Self {
        Self { server, conn_id }
    }

    /// Serves the line protocol over any transport.  Split out from `run`
    /// so unit tests can drive it with an in-memory mock stream.
    async fn serve<S>(&self, stream: S) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut lines = BufReader::new(read_half).lines();

        while let Some(line) = lines.next_line().await? {
            let reply = self.execute(&line);
            debug!(conn_id = %self.conn_id, request = %line.trim(), %reply, "script command");
            write_half.write_all(format!("{reply}\n").as_bytes()).await?;
        }
        Ok(())
    }

    /// Executes one request line against the server accessors.
    fn execute(&self, line: &str) -> String {
        match ScriptCommand::parse(line) {
            Some(ScriptCommand::Count) => self.server.device_count().to_string(),
            Some(ScriptCommand::Status(id)) => {
                if self.server.get_device(&id).is_some() {
                    "online".to_string()
                } else {
                    "offline".to_string()
                }
            }
            Some(ScriptCommand::Drop(id)) => {
                self.server.remove_device(&id);
                "ok".to_string()
            }
            Some(ScriptCommand::Uptime) => self.server.uptime().as_secs().to_string(),
            None => "err unknown command".to_string(),
        }
    }
}

#[async_trait]
impl Session for ScriptSession {
    fn kind(&self) -> &'static str {
        "script"
    }

    async fn run(self: Arc<Self>, stream: TcpStream) -> anyhow::Result<()> {
        self.serve(stream).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
