use snafu::Snafu;

use crate::logging::LoggerError;

/// Top-level startup/run errors. A driver error encountered outside of a
/// single request handler (at startup, from the reaper, or from a
/// system-info query) is fatal and should trigger broker shutdown;
/// `Fatal` is how that propagates out of `Broker::run`.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum BrokerError {
    #[snafu(display("failed to initialize logger"))]
    LoggerInit { source: LoggerError },

    #[snafu(display("failed to initialize device inspector"))]
    InspectorInit {
        source: device_inspector::InspectorError,
    },

    #[snafu(display("failed to bind {}:{}", host, port))]
    Bind {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[snafu(display("fatal driver error, shutting down"))]
    Fatal {
        source: device_inspector::InspectorError,
    },
}

pub type BrokerResult<T> = Result<T, BrokerError>;
