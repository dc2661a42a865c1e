//! # devhub-core
//!
//! Domain logic for the DevHub daemon, shared by the daemon binary and its
//! integration tests.
//!
//! The daemon listens on a single TCP port and serves two kinds of peers:
//! **local scripts** (control connections from the same host or LAN address)
//! and **remote devices** (long-lived sessions from other machines that the
//! daemon tracks for presence and liveness).  This crate contains the pieces
//! of that story that need no sockets at all:
//!
//! - **`classify`** – the pure decision that routes an accepted connection
//!   to the script path or the device path, based on the peer address and
//!   the daemon's resolved local address.
//!
//! - **`device`** – the [`Device`] trait: a registered remote session with a
//!   stable unique identifier, a connection timestamp, a liveness predicate,
//!   and idempotent stop/close operations.
//!
//! - **`registry`** – the [`DeviceRegistry`]: the daemon's only piece of
//!   concurrent shared mutable state.  One entry per identifier, liveness
//!   checked on every lookup, drained exactly once at shutdown.
//!
//! This crate has zero dependencies on OS APIs or network sockets, so every
//! invariant is testable without opening a port.

pub mod classify;
pub mod device;
pub mod registry;

pub use classify::{classify, ConnectionKind};
pub use device::Device;
pub use registry::DeviceRegistry;
