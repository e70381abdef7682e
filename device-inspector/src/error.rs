use snafu::Snafu;

/// Errors raised by a `DeviceInspector`. Split into exactly two policy
/// classes: a permission failure the broker logs and surfaces to the
/// caller, and everything else, which is fatal and should trigger broker
/// shutdown.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum InspectorError {
    #[snafu(display("permission denied querying/mutating device {}", index))]
    PermissionDenied { index: u32 },

    #[snafu(display("driver error on device {}: {}", index, message))]
    Driver { index: u32, message: String },

    #[snafu(display("device index {} is out of range (device_count = {})", index, count))]
    NoSuchDevice { index: u32, count: u32 },
}

impl InspectorError {
    /// `true` for every error class except permission-denied: a `Driver`
    /// or `NoSuchDevice` error is treated as fatal and should trigger the
    /// broker's clean-up/shutdown path.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, InspectorError::PermissionDenied { .. })
    }

    /// The device index the error pertains to.
    pub fn device_index(&self) -> u32 {
        match self {
            InspectorError::PermissionDenied { index }
            | InspectorError::Driver { index, .. }
            | InspectorError::NoSuchDevice { index, .. } => *index,
        }
    }
}

/// Convenience alias used throughout the inspector API.
pub type InspectorResult<T> = Result<T, InspectorError>;
