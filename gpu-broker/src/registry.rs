//! In-memory mapping from reservation handle to live holder. Purely data:
//! no I/O happens here, only `HashMap` bookkeeping behind a lock — inner
//! state behind a `tokio::sync::Mutex`, with a cheaply cloneable handle
//! via `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use device_inspector::{ComputeMode, DeviceInspector, InspectorError};
use holder_supervisor::Holder;
use tokio::sync::Mutex;

use crate::logging::Logger;

/// The in-memory record created when a client is granted a device.
pub struct Reservation {
    pub handle: String,
    pub device_index: u32,
    pub exclusive: bool,
    pub holder: Holder,
}

/// Stop `reservation`'s holder and, if it was exclusive, restore its
/// device's compute-mode to `Default`. Shared by every path that retires
/// a reservation (allocate's rollback, release, clean-up): the
/// stop-then-restore sequence and its logging are the same regardless of
/// why the reservation is going away. Returns the compute-mode restore's
/// result so the caller can decide what to do with a failure (clean-up
/// and rollback just log it; release re-surfaces it to the client).
pub async fn stop_and_restore(
    inspector: &dyn DeviceInspector,
    logger: &Logger,
    reservation: &mut Reservation,
) -> Result<(), InspectorError> {
    if let Err(err) = reservation.holder.stop().await {
        logger.error(format!(
            "failed to stop holder {} (device {}): {}",
            reservation.handle, reservation.device_index, err
        ));
    }
    if reservation.exclusive {
        inspector.set_compute_mode(reservation.device_index, ComputeMode::Default)?;
    }
    Ok(())
}

/// Process-wide `handle -> Reservation` map. Each individual operation is
/// atomic under its own lock acquisition, but a caller that needs to
/// check-then-act across more than one call (allocate's idle scan before
/// its commit loop) needs its own coordination on top — see
/// `BrokerState::admission_lock`.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<String, Reservation>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, reservation: Reservation) {
        let mut guard = self.inner.lock().await;
        guard.insert(reservation.handle.clone(), reservation);
    }

    pub async fn remove(&self, handle: &str) -> Option<Reservation> {
        let mut guard = self.inner.lock().await;
        guard.remove(handle)
    }

    pub async fn contains(&self, handle: &str) -> bool {
        let guard = self.inner.lock().await;
        guard.contains_key(handle)
    }

    /// Whether any reservation (exclusive or not) currently pins device
    /// `index`. Used by the exclusive-mode admission predicate.
    pub async fn device_in_use(&self, index: u32) -> bool {
        let guard = self.inner.lock().await;
        guard.values().any(|r| r.device_index == index)
    }

    /// All handles currently recorded, snapshotted for the reaper's scan.
    pub async fn handles(&self) -> Vec<String> {
        let guard = self.inner.lock().await;
        guard.keys().cloned().collect()
    }

    /// `None` if `handle` is no longer present; otherwise whether its
    /// holder is still alive.
    pub async fn is_alive(&self, handle: &str) -> Option<bool> {
        let mut guard = self.inner.lock().await;
        guard.get_mut(handle).map(|r| r.holder.is_alive())
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
