//! The live device registry: the daemon's only concurrent shared state.
//!
//! Every connected remote device registers itself here under its unique
//! identifier.  Script connections, the shutdown path, and other device
//! sessions all query and mutate this map concurrently, so every operation
//! takes the registry's single internal lock.
//!
//! # Invariants
//!
//! - **One entry per identifier.**  Inserting an identifier that is already
//!   registered first *evicts* the previous holder (stop + close + remove).
//!   A device that reconnects (e.g. after a crash, before its old socket
//!   times out) therefore always displaces its stale predecessor.
//!
//! - **Lookups never return a dead device.**  [`lookup`] checks
//!   [`Device::is_active`] under the lock; a present-but-inactive entry is
//!   evicted as a side effect and the lookup reports not-found.  Callers can
//!   never observe a device whose transport is already gone.
//!
//! # Locking discipline
//!
//! One `std::sync::Mutex` guards the whole map.  Device counts are small
//! (tens, not thousands) and no registry operation performs I/O or awaits,
//! so a single coarse lock keeps every operation linearizable without
//! per-key machinery.  The lock is never held across an `.await`; none of
//! these methods are async.
//!
//! [`lookup`]: DeviceRegistry::lookup

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::device::Device;

/// Concurrent map from device identifier to live session.
///
/// Created once with the server and shared via `Arc`; drained exactly once
/// at shutdown with [`remove_all`](DeviceRegistry::remove_all).
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<String, Arc<dyn Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device, evicting any previous holder of the same
    /// identifier first.
    ///
    /// The registry only stores the session; actually *running* the new
    /// session's logic remains the caller's responsibility.
    pub fn insert(&self, device: Arc<dyn Device>) {
        let mut devices = self.devices.lock().expect("device registry poisoned");
        let id = device.unique_identifier().to_owned();
        if let Some(previous) = devices.remove(&id) {
            info!(
                identifier = %id,
                "device already registered; evicting previous session"
            );
            evict(&previous);
        }
        devices.insert(id, device);
    }

    /// Liveness-checked lookup.
    ///
    /// Returns the registered device only if it is currently active.  A
    /// present-but-inactive entry is evicted as part of this call and `None`
    /// is returned, so the check and the cleanup are atomic with respect to
    /// every other registry operation.
    pub fn lookup(&self, identifier: &str) -> Option<Arc<dyn Device>> {
        let mut devices = self.devices.lock().expect("device registry poisoned");
        match devices.get(identifier) {
            Some(device) if device.is_active() => Some(Arc::clone(device)),
            Some(_) => {
                info!(identifier, "registered device is no longer active; evicting");
                let stale = devices.remove(identifier).expect("entry present");
                evict(&stale);
                None
            }
            None => None,
        }
    }

    /// Unconditionally evicts the device with the given identifier.
    ///
    /// No-op if the identifier is not registered.
    pub fn remove(&self, identifier: &str) {
        let mut devices = self.devices.lock().expect("device registry poisoned");
        if let Some(device) = devices.remove(identifier) {
            evict(&device);
        }
    }

    /// Evicts every registered device.  Used once, at shutdown.
    ///
    /// A failing `stop`/`close_socket` on one device never prevents the
    /// remaining entries from being evicted; after this call the registry is
    /// empty regardless of individual device state.
    pub fn remove_all(&self) {
        let mut devices = self.devices.lock().expect("device registry poisoned");
        for (identifier, device) in devices.drain() {
            info!(identifier = %identifier, "evicting device on shutdown");
            evict(&device);
        }
    }

    /// Snapshot of the number of registered devices.
    ///
    /// May be stale by the time the caller reads it; diagnostics only.
    pub fn count(&self) -> usize {
        self.devices.lock().expect("device registry poisoned").len()
    }
}

/// The eviction sequence applied to an entry that has already been removed
/// from the map: stop the session, then release its transport.
///
/// Failures are logged and swallowed.  Eviction is housekeeping; it must
/// complete for every entry even when a session's teardown misbehaves.
fn evict(device: &Arc<dyn Device>) {
    let connected_for = device.connected_at().elapsed();
    info!(
        identifier = device.unique_identifier(),
        connected_for_secs = connected_for.as_secs(),
        "stopping evicted device session"
    );
    device.stop();
    if let Err(e) = device.close_socket() {
        warn!(
            identifier = device.unique_identifier(),
            "error closing evicted device socket: {e}"
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
