//! An in-memory `DeviceInspector` used by the broker's test suite, so
//! admission/reaper logic can be exercised without a real GPU.

use std::sync::Mutex;

use crate::{ComputeMode, DeviceInspector, InspectorError, InspectorResult, MemInfo};

#[derive(Debug, Clone)]
struct DeviceState {
    free_bytes: u64,
    total_bytes: u64,
    running_processes: u32,
    compute_mode: ComputeMode,
    /// When set, every call touching this device fails with this error.
    fault: Option<FaultKind>,
}

#[derive(Debug, Clone, Copy)]
pub enum FaultKind {
    PermissionDenied,
    Driver,
}

/// A fixed-size fleet of simulated devices, each independently
/// configurable. Driver version is a constant test fixture string.
pub struct MockInspector {
    devices: Mutex<Vec<DeviceState>>,
    driver_version: String,
}

impl MockInspector {
    /// `count` devices, each reporting `total_bytes` total memory, fully
    /// free, `Default` compute mode, no running processes.
    pub fn new(count: u32, total_bytes: u64) -> Self {
        let devices = (0..count)
            .map(|_| DeviceState {
                free_bytes: total_bytes,
                total_bytes,
                running_processes: 0,
                compute_mode: ComputeMode::Default,
                fault: None,
            })
            .collect();
        Self {
            devices: Mutex::new(devices),
            driver_version: "mock-driver-1.0".to_string(),
        }
    }

    pub fn set_free_bytes(&self, index: u32, free_bytes: u64) {
        self.devices.lock().unwrap()[index as usize].free_bytes = free_bytes;
    }

    pub fn set_running_processes(&self, index: u32, count: u32) {
        self.devices.lock().unwrap()[index as usize].running_processes = count;
    }

    pub fn set_fault(&self, index: u32, fault: Option<FaultKind>) {
        self.devices.lock().unwrap()[index as usize].fault = fault;
    }

    fn with_device<T>(
        &self,
        index: u32,
        f: impl FnOnce(&mut DeviceState) -> T,
    ) -> InspectorResult<T> {
        let mut devices = self.devices.lock().unwrap();
        let count = devices.len() as u32;
        let device = devices
            .get_mut(index as usize)
            .ok_or(InspectorError::NoSuchDevice { index, count })?;
        if let Some(fault) = device.fault {
            return Err(match fault {
                FaultKind::PermissionDenied => InspectorError::PermissionDenied { index },
                FaultKind::Driver => InspectorError::Driver {
                    index,
                    message: "simulated driver fault".to_string(),
                },
            });
        }
        Ok(f(device))
    }
}

impl DeviceInspector for MockInspector {
    fn device_count(&self) -> InspectorResult<u32> {
        Ok(self.devices.lock().unwrap().len() as u32)
    }

    fn running_process_count(&self, index: u32) -> InspectorResult<u32> {
        self.with_device(index, |d| d.running_processes)
    }

    fn mem_info(&self, index: u32) -> InspectorResult<MemInfo> {
        self.with_device(index, |d| MemInfo {
            free_bytes: d.free_bytes,
            total_bytes: d.total_bytes,
        })
    }

    fn get_compute_mode(&self, index: u32) -> InspectorResult<ComputeMode> {
        self.with_device(index, |d| d.compute_mode)
    }

    fn set_compute_mode(&self, index: u32, mode: ComputeMode) -> InspectorResult<()> {
        self.with_device(index, |d| {
            d.compute_mode = mode;
        })
    }

    fn driver_version(&self) -> InspectorResult<String> {
        Ok(self.driver_version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_compute_mode_is_idempotent_and_observable() {
        let inspector = MockInspector::new(1, 100);
        inspector
            .set_compute_mode(0, ComputeMode::ExclusiveProcess)
            .unwrap();
        assert_eq!(
            inspector.get_compute_mode(0).unwrap(),
            ComputeMode::ExclusiveProcess
        );
        // idempotent no-op
        inspector
            .set_compute_mode(0, ComputeMode::ExclusiveProcess)
            .unwrap();
        assert_eq!(
            inspector.get_compute_mode(0).unwrap(),
            ComputeMode::ExclusiveProcess
        );
    }

    #[test]
    fn permission_denied_is_not_fatal_but_driver_fault_is() {
        let inspector = MockInspector::new(1, 100);
        inspector.set_fault(0, Some(FaultKind::PermissionDenied));
        let err = inspector.mem_info(0).unwrap_err();
        assert!(!err.is_fatal());

        inspector.set_fault(0, Some(FaultKind::Driver));
        let err = inspector.mem_info(0).unwrap_err();
        assert!(err.is_fatal());
    }
}
