//! `DeviceInspector` backed by NVML, via the `nvml-wrapper` crate — the
//! binding the wider Rust GPU-tooling ecosystem reaches for.

use nvml_wrapper::enum_wrappers::device::ComputeMode as NvmlComputeMode;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;

use crate::{ComputeMode, DeviceInspector, InspectorError, InspectorResult, MemInfo};

/// Live NVML-backed inspector. One instance is created at broker startup
/// and shared (read-only after construction) for the process lifetime.
pub struct NvmlInspector {
    nvml: Nvml,
}

impl NvmlInspector {
    /// Initialize the NVML library. Fails fatally if NVML cannot be
    /// loaded at all — there is no degraded mode without a driver.
    pub fn new() -> InspectorResult<Self> {
        let nvml = Nvml::init().map_err(|source| map_err(0, source))?;
        Ok(Self { nvml })
    }

    fn device(&self, index: u32) -> InspectorResult<nvml_wrapper::Device<'_>> {
        self.nvml.device_by_index(index).map_err(|source| map_err(index, source))
    }
}

/// Classify an `NvmlError` per the inspector's two-class policy:
/// permission failures are distinguished from every other driver error.
fn map_err(index: u32, source: NvmlError) -> InspectorError {
    match source {
        NvmlError::NoPermission => InspectorError::PermissionDenied { index },
        other => InspectorError::Driver {
            index,
            message: other.to_string(),
        },
    }
}

impl DeviceInspector for NvmlInspector {
    fn device_count(&self) -> InspectorResult<u32> {
        self.nvml.device_count().map_err(|source| map_err(0, source))
    }

    fn running_process_count(&self, index: u32) -> InspectorResult<u32> {
        let device = self.device(index)?;
        let procs = device
            .running_compute_processes()
            .map_err(|source| map_err(index, source))?;
        Ok(procs.len() as u32)
    }

    fn mem_info(&self, index: u32) -> InspectorResult<MemInfo> {
        let device = self.device(index)?;
        let info = device.memory_info().map_err(|source| map_err(index, source))?;
        Ok(MemInfo {
            free_bytes: info.free,
            total_bytes: info.total,
        })
    }

    fn get_compute_mode(&self, index: u32) -> InspectorResult<ComputeMode> {
        let device = self.device(index)?;
        let mode = device
            .compute_mode()
            .map_err(|source| map_err(index, source))?;
        Ok(from_nvml_mode(mode))
    }

    fn set_compute_mode(&self, index: u32, mode: ComputeMode) -> InspectorResult<()> {
        let device = self.device(index)?;
        let current = device
            .compute_mode()
            .map_err(|source| map_err(index, source))?;
        if from_nvml_mode(current) == mode {
            // Idempotent no-op: avoids log noise and a redundant driver call.
            return Ok(());
        }
        device
            .set_compute_mode(to_nvml_mode(mode))
            .map_err(|source| map_err(index, source))?;
        tracing::info!(%index, ?mode, "gpu compute mode set");
        Ok(())
    }

    fn driver_version(&self) -> InspectorResult<String> {
        self.nvml.sys_driver_version().map_err(|source| map_err(0, source))
    }
}

fn from_nvml_mode(mode: NvmlComputeMode) -> ComputeMode {
    match mode {
        NvmlComputeMode::ExclusiveProcess => ComputeMode::ExclusiveProcess,
        _ => ComputeMode::Default,
    }
}

fn to_nvml_mode(mode: ComputeMode) -> NvmlComputeMode {
    match mode {
        ComputeMode::Default => NvmlComputeMode::Default,
        ComputeMode::ExclusiveProcess => NvmlComputeMode::ExclusiveProcess,
    }
}
