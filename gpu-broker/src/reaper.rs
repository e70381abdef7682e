//! The periodic reaper: the only cleanup path for holders that die
//! unexpectedly. Wakes on `BrokerConfig::reaper_interval` (default 5s)
//! and reconciles the registry with actual holder liveness.

use device_inspector::{ComputeMode, DeviceInspector, InspectorError};

use crate::logging::Logger;
use crate::registry::Registry;

/// Run one reaper scan. Returns `Some(err)` if a fatal (non
/// permission-denied) driver error was encountered restoring a device's
/// compute-mode — the caller (the broker's main loop) treats that as the
/// trigger for the clean-up/shutdown path.
pub async fn reap_once(
    inspector: &dyn DeviceInspector,
    registry: &Registry,
    logger: &Logger,
) -> Option<InspectorError> {
    let handles = registry.handles().await;
    logger.debug(format!("reaper heartbeat, {} pending", handles.len()));

    for handle in handles {
        let alive = match registry.is_alive(&handle).await {
            Some(alive) => alive,
            None => continue, // already removed by a concurrent release
        };
        if alive {
            continue;
        }

        let reservation = match registry.remove(&handle).await {
            Some(r) => r,
            None => continue,
        };
        logger.warning(format!(
            "holder {} (pid {}) for device {} terminated unexpectedly, reaping",
            handle,
            reservation.holder.pid(),
            reservation.device_index
        ));

        if reservation.exclusive {
            match inspector.set_compute_mode(reservation.device_index, ComputeMode::Default) {
                Ok(()) => {}
                Err(err) if !err.is_fatal() => {
                    logger.error(format!(
                        "permission denied restoring compute mode for device {} during reap of {}: {}",
                        reservation.device_index, handle, err
                    ));
                }
                Err(err) => {
                    logger.error(format!(
                        "fatal driver error restoring compute mode for device {} during reap of {}: {}",
                        reservation.device_index, handle, err
                    ));
                    return Some(err);
                }
            }
        }
    }

    None
}
