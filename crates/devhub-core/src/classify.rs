//! Connection classification: local script vs remote device.
//!
//! The daemon serves two protocols on one port and tells them apart purely
//! by where the connection comes from.  A peer on the loopback interface or
//! on the daemon's own LAN address is a script run by the local user; any
//! other peer is a device.
//!
//! # Why exact address equality? (for beginners)
//!
//! The LAN check compares the peer address to the daemon's resolved local
//! address with plain `==`, not with a subnet mask.  A machine elsewhere on
//! the same subnet is *not* local; only a connection that originates from
//! this very host qualifies.  Widening this to CIDR matching would silently
//! promote every LAN neighbour to the trusted script path.

use std::net::IpAddr;

/// The two handling paths an accepted connection can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Control connection from the local host; routed to the script handler.
    LocalScript,
    /// Long-lived session from a remote machine; routed to the device handler.
    RemoteDevice,
}

/// Classifies an accepted connection by its peer address.
///
/// Rules, in order:
///
/// 1. `allow_remote_override` forces [`ConnectionKind::RemoteDevice`] for
///    every peer, including loopback.  Used when scripts and devices run on
///    the same machine (e.g. during development).
/// 2. A loopback peer, or a peer exactly equal to `local_addr`, is a
///    [`ConnectionKind::LocalScript`].
/// 3. Everything else is a [`ConnectionKind::RemoteDevice`].
///
/// Pure decision: no side effects and no failure modes.  Callers must have
/// resolved `local_addr` successfully before accepting any connection;
/// resolution failure is a fatal startup condition, so this function is
/// never reached without a usable local address.
pub fn classify(peer: IpAddr, allow_remote_override: bool, local_addr: IpAddr) -> ConnectionKind {
    if allow_remote_override {
        return ConnectionKind::RemoteDevice;
    }
    if peer.is_loopback() || peer == local_addr {
        ConnectionKind::LocalScript
    } else {
        ConnectionKind::RemoteDevice
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
