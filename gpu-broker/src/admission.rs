//! The admission predicate and the allocate handler: given
//! `(num_gpus, exclusive, mem_size)`, pick idle devices, spawn one holder
//! per device, and roll everything back if any step fails.

use broker_protocol::Reply;
use device_inspector::{ComputeMode, DeviceInspector, InspectorError};
use holder_supervisor::HolderSupervisor;

use crate::logging::Logger;
use crate::registry::{stop_and_restore, Reservation, Registry};

const IDLE_MEMORY_FRACTION: f64 = 0.7;

fn memory_ok(free_bytes: u64, total_bytes: u64, mem_size: Option<u64>) -> bool {
    match mem_size {
        Some(requested) => free_bytes > requested,
        None if total_bytes == 0 => false,
        None => (free_bytes as f64) / (total_bytes as f64) > IDLE_MEMORY_FRACTION,
    }
}

async fn is_idle(
    inspector: &dyn DeviceInspector,
    registry: &Registry,
    index: u32,
    exclusive: bool,
    mem_size: Option<u64>,
) -> Result<bool, InspectorError> {
    let mem = inspector.mem_info(index)?;
    if exclusive {
        let no_running = inspector.running_process_count(index)? == 0;
        let not_reserved = !registry.device_in_use(index).await;
        Ok(no_running && not_reserved && memory_ok(mem.free_bytes, mem.total_bytes, mem_size))
    } else {
        // This predicate does not consult the registry, so the broker
        // will hand out the same device to N non-exclusive clients as
        // long as the driver still reports enough free memory.
        let mode = inspector.get_compute_mode(index)?;
        Ok(memory_ok(mem.free_bytes, mem.total_bytes, mem_size) && mode == ComputeMode::Default)
    }
}

/// Undo every reservation in `committed`: stop its holder, restore
/// compute-mode if it was exclusive, and remove it from the registry.
/// Driver errors encountered here are logged, not propagated.
async fn rollback(
    inspector: &dyn DeviceInspector,
    registry: &Registry,
    logger: &Logger,
    committed: &[String],
) {
    for handle in committed {
        if let Some(mut reservation) = registry.remove(handle).await {
            if let Err(err) = stop_and_restore(inspector, logger, &mut reservation).await {
                logger.error(format!(
                    "failed to restore compute mode for device {} during allocate rollback of {}: {}",
                    reservation.device_index, handle, err
                ));
            }
        }
    }
}

/// Handle an `AllocateGpus` request. Never returns an error: every failure
/// mode here resolves to a clean `success=false` reply. The
/// "not enough idle GPUs" path returns directly, before anything is
/// committed, so there is nothing to roll back.
pub async fn allocate(
    inspector: &dyn DeviceInspector,
    registry: &Registry,
    supervisor: &HolderSupervisor,
    logger: &Logger,
    num_gpus: u32,
    exclusive: bool,
    mem_size: Option<u64>,
) -> Reply {
    if num_gpus == 0 {
        // Nothing to scan, nothing to commit: a request for zero devices
        // trivially succeeds with empty lists.
        return Reply::AllocateGpus {
            success: true,
            device_indices: Vec::new(),
            pids: Vec::new(),
            handles: Vec::new(),
        };
    }

    let device_count = match inspector.device_count() {
        Ok(n) => n,
        Err(err) => {
            logger.error(format!("failed to query device count during allocate: {}", err));
            return Reply::allocate_failed();
        }
    };

    let mut idle_devices = Vec::new();
    for index in 0..device_count {
        match is_idle(inspector, registry, index, exclusive, mem_size).await {
            Ok(true) => {
                idle_devices.push(index);
                if idle_devices.len() as u32 == num_gpus {
                    break;
                }
            }
            Ok(false) => {}
            Err(err) if !err.is_fatal() => {
                logger.warning(format!(
                    "permission denied inspecting device {} during allocate: {}",
                    index, err
                ));
            }
            Err(err) => {
                // A driver error encountered while servicing an allocate
                // call fails that call; it does not by itself trigger
                // broker shutdown.
                logger.error(format!(
                    "driver error inspecting device {} during allocate: {}",
                    index, err
                ));
                return Reply::allocate_failed();
            }
        }
    }

    if (idle_devices.len() as u32) < num_gpus {
        // Nothing has been mutated yet: fail cleanly, no rollback needed.
        return Reply::allocate_failed();
    }

    let mut device_indices = Vec::new();
    let mut pids = Vec::new();
    let mut handles = Vec::new();
    let mut committed: Vec<String> = Vec::new();

    for index in idle_devices {
        if exclusive {
            if let Err(err) = inspector.set_compute_mode(index, ComputeMode::ExclusiveProcess) {
                logger.error(format!(
                    "failed to set exclusive compute mode on device {}, rolling back allocate: {}",
                    index, err
                ));
                rollback(inspector, registry, logger, &committed).await;
                return Reply::allocate_failed();
            }
        }

        match supervisor.spawn(index, exclusive).await {
            Ok(holder) => {
                let handle = uuid::Uuid::new_v4().to_simple().to_string();
                let pid = holder.pid();
                registry
                    .insert(Reservation {
                        handle: handle.clone(),
                        device_index: index,
                        exclusive,
                        holder,
                    })
                    .await;
                committed.push(handle.clone());
                device_indices.push(index);
                pids.push(pid);
                handles.push(handle);
            }
            Err(err) => {
                logger.error(format!(
                    "holder spawn failed for device {}, rolling back allocate: {}",
                    index, err
                ));
                if exclusive {
                    if let Err(restore_err) =
                        inspector.set_compute_mode(index, ComputeMode::Default)
                    {
                        logger.error(format!(
                            "failed to restore compute mode for device {} after failed spawn: {}",
                            index, restore_err
                        ));
                    }
                }
                rollback(inspector, registry, logger, &committed).await;
                return Reply::allocate_failed();
            }
        }
    }

    Reply::AllocateGpus {
        success: true,
        device_indices,
        pids,
        handles,
    }
}
