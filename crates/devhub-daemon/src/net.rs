//! Local address resolution.
//!
//! The classifier needs the daemon's own LAN address to compare peer
//! addresses against.  It is resolved exactly once at startup; without it no
//! local/remote distinction is possible, so a resolution failure is fatal.
//!
//! # The UDP-connect trick (for beginners)
//!
//! Asking the OS "what is my IP address?" is surprisingly fiddly: a host can
//! have many interfaces and many addresses.  The portable answer is to
//! `connect()` a UDP socket to some routable address and read back the local
//! address the kernel chose for that route.  No datagram is ever sent:
//! `connect()` on UDP only records the peer and picks a source address, so
//! this works without any traffic and without the target host existing.

use std::net::{IpAddr, UdpSocket};

/// Routable anchor used to let the kernel pick our outbound source address.
/// Never actually contacted.
const RESOLVE_ANCHOR: &str = "8.8.8.8:80";

/// Resolves the address this host would use for outbound LAN/WAN traffic.
///
/// # Errors
///
/// Returns the underlying I/O error when the socket cannot be created or no
/// route exists (e.g. the host has no usable network interface).  Callers
/// treat this as a fatal startup condition.
pub fn resolve_local_addr() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.connect(RESOLVE_ANCHOR)?;
    Ok(socket.local_addr()?.ip())
}
