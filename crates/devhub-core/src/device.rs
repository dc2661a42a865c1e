//! The [`Device`] trait: a registered remote peer session.
//!
//! The registry owns the *mapping* from identifier to device, but not the
//! device's internal protocol.  What it needs from a session is small: a
//! stable key, a timestamp for diagnostics, a liveness predicate, and a way
//! to tear the session down when it is evicted.  Everything else stays in
//! the session handler that created the device.
//!
//! The previous generation of this daemon modelled a device as a subclass
//! of its connection thread.  Here the device is a plain trait the session
//! type implements; the session's `run` future is scheduled separately and
//! merely shares state with the trait object held by the registry.

use std::io;
use std::time::Instant;

/// A live remote session tracked by the [`DeviceRegistry`].
///
/// Implementations must be shareable across tasks: the registry hands out
/// `Arc<dyn Device>` clones, and eviction can race with the session's own
/// natural termination.  In particular:
///
/// - [`stop`] and [`close_socket`] must be **idempotent**: eviction and the
///   session's own teardown both call them, in any order, possibly twice.
/// - [`is_active`] must become `false` once the underlying transport is no
///   longer usable, so the registry's liveness-checked lookup can reap the
///   entry.
///
/// [`DeviceRegistry`]: crate::registry::DeviceRegistry
/// [`stop`]: Device::stop
/// [`close_socket`]: Device::close_socket
/// [`is_active`]: Device::is_active
#[cfg_attr(test, mockall::automock)]
pub trait Device: Send + Sync {
    /// Stable unique identifier of the physical device; the registry key.
    fn unique_identifier(&self) -> &str;

    /// Instant at which the session was established.
    ///
    /// Used for connection-duration log context when the entry is evicted.
    fn connected_at(&self) -> Instant;

    /// Whether the session's transport is still usable.
    fn is_active(&self) -> bool;

    /// Signals the session's logic to terminate.  Idempotent.
    fn stop(&self);

    /// Releases the session's transport.  Idempotent; safe after [`stop`]
    /// and after the session already terminated naturally.
    ///
    /// # Errors
    ///
    /// May report an I/O error from the underlying close.  Callers performing
    /// registry housekeeping log the error and carry on; a failed close must
    /// never leave the entry registered.
    ///
    /// [`stop`]: Device::stop
    fn close_socket(&self) -> io::Result<()>;
}
