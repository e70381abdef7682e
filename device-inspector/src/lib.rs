#![warn(missing_docs)]
//! Abstract read/write interface over the GPU driver.
//!
//! The engine (`gpu-broker`) only ever talks to `dyn DeviceInspector`; this
//! keeps admission/reaping logic independent of the concrete NVML binding,
//! and lets the test suite swap in an in-memory fake.

pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod nvml;

pub use error::{InspectorError, InspectorResult};

/// A device's compute-sharing mode, mirroring the NVML
/// `nvmlComputeMode_t` values this broker cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    /// Multiple contexts may share the device.
    Default,
    /// Only one compute context may use the device at a time.
    ExclusiveProcess,
}

/// Free/total memory in bytes, as reported by the driver at inspection
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

/// Narrow capability used by the rest of the core. An implementation
/// typically wraps a vendor driver library; the engine must not depend on
/// specifics.
pub trait DeviceInspector: Send + Sync {
    /// Number of devices visible to the driver.
    fn device_count(&self) -> InspectorResult<u32>;

    /// Number of compute processes the driver attributes to device `i`.
    fn running_process_count(&self, index: u32) -> InspectorResult<u32>;

    /// Free/total memory of device `i`, in bytes.
    fn mem_info(&self, index: u32) -> InspectorResult<MemInfo>;

    /// Current compute-mode of device `i`.
    fn get_compute_mode(&self, index: u32) -> InspectorResult<ComputeMode>;

    /// Set device `i`'s compute-mode. Idempotent: implementations must
    /// no-op when the device is already in `mode`, both to avoid log
    /// noise and to avoid driver errors on a redundant transition.
    fn set_compute_mode(&self, index: u32, mode: ComputeMode) -> InspectorResult<()>;

    /// The driver's version string.
    fn driver_version(&self) -> InspectorResult<String>;
}

/// Reset every device's compute-mode to `Default`. Run once at startup so
/// the broker never inherits a leftover exclusive lock from a previous
/// run. A permission-denied error for one device is logged and does not
/// stop the sweep; any other error is propagated so the caller can apply
/// the broker's fatal-error policy.
pub fn reset_all_devices(inspector: &dyn DeviceInspector) -> InspectorResult<()> {
    let count = inspector.device_count()?;
    for index in 0..count {
        match inspector.set_compute_mode(index, ComputeMode::Default) {
            Ok(()) => {}
            Err(err) if !err.is_fatal() => {
                tracing::warn!(%index, error = %err, "permission denied resetting device compute mode");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
