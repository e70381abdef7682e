use snafu::Snafu;

/// Errors that can occur while framing or (de)serializing a message on the
/// wire. These are distinct from the broker's own domain errors (see
/// `gpu-broker::error`) — this crate only knows about bytes and JSON.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum CodecError {
    #[snafu(display("peer closed the connection before sending a complete message"))]
    StreamClosed,

    #[snafu(display("io error while framing message"))]
    Io { source: std::io::Error },

    #[snafu(display("failed to serialize message body"))]
    Serialize { source: serde_json::Error },

    #[snafu(display("failed to deserialize message body: {}", body))]
    Deserialize {
        body: String,
        source: serde_json::Error,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;
