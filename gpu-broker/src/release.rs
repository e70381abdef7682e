//! The release handler: the only orderly-return path for a reservation
//! (the reaper is the only unexpected-death path).

use broker_protocol::Reply;
use device_inspector::DeviceInspector;

use crate::logging::Logger;
use crate::registry::{stop_and_restore, Registry};

/// Release every handle in `handles`. An unknown handle is recorded as a
/// failed release, not an error. A driver error restoring compute-mode is
/// also recorded as failed, and the reservation is kept so the broker can
/// surface the problem and the reaper can retry once the (now-stopped)
/// holder is observed dead.
pub async fn release(
    inspector: &dyn DeviceInspector,
    registry: &Registry,
    logger: &Logger,
    handles: Vec<String>,
) -> Reply {
    let mut failed = Vec::new();

    for handle in handles {
        match registry.remove(&handle).await {
            None => failed.push(handle),
            Some(mut reservation) => {
                if let Err(err) = stop_and_restore(inspector, logger, &mut reservation).await {
                    logger.error(format!(
                        "failed to restore compute mode for device {} on release of {}: {}",
                        reservation.device_index, handle, err
                    ));
                    registry.insert(reservation).await;
                    failed.push(handle);
                }
            }
        }
    }

    Reply::ReleaseGpus {
        success: failed.is_empty(),
        failed_handles: failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_handle_is_a_failed_release_not_an_error() {
        let inspector = device_inspector::mock::MockInspector::new(1, 100);
        let registry = Registry::new();
        let logger_dir = tempfile::tempdir().unwrap();
        let logger = Logger::open(logger_dir.path()).unwrap();

        let reply = release(&inspector, &registry, &logger, vec!["deadbeef".to_string()]).await;
        assert_eq!(
            reply,
            Reply::ReleaseGpus {
                success: false,
                failed_handles: vec!["deadbeef".to_string()],
            }
        );
    }
}
