use snafu::Snafu;

/// Failure to bring up a holder process for a reservation. Carries enough
/// context for the caller to log and roll back.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum HolderStartError {
    #[snafu(display("failed to spawn holder process for device {}", device_index))]
    Spawn {
        device_index: u32,
        source: std::io::Error,
    },

    #[snafu(display(
        "holder process for device {} exited before reporting attach status"
    ))]
    DiedBeforeAttach { device_index: u32 },

    #[snafu(display(
        "holder process for device {} reported an attach failure: {}",
        device_index,
        message
    ))]
    AttachFailed { device_index: u32, message: String },

    #[snafu(display("failed to read attach status from holder for device {}", device_index))]
    ReadStatus {
        device_index: u32,
        source: std::io::Error,
    },
}

impl HolderStartError {
    pub fn device_index(&self) -> u32 {
        match self {
            HolderStartError::Spawn { device_index, .. }
            | HolderStartError::DiedBeforeAttach { device_index }
            | HolderStartError::AttachFailed { device_index, .. }
            | HolderStartError::ReadStatus { device_index, .. } => *device_index,
        }
    }
}

/// Failure to stop an already-running holder. Non-fatal to the broker;
/// the caller decides how to surface it (the reaper just logs it).
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum HolderStopError {
    #[snafu(display("holder (pid {}) did not exit within the shutdown timeout and was killed", pid))]
    TimedOutAndKilled { pid: u32 },
}
