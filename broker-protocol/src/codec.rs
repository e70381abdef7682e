//! Sentinel-framed, JSON-encoded message codec shared verbatim between the
//! broker and its clients: `<json-body>[STOP]` per message, one message per
//! TCP connection.

use serde::{de::DeserializeOwned, Serialize};
use snafu::{IntoError, ResultExt};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CodecResult, Deserialize as DeserializeCtx, Io as IoCtx, Serialize as SerializeCtx, StreamClosed as StreamClosedCtx};

/// The literal 6-byte sentinel terminating every message.
pub const STOP_SENTINEL: &[u8] = b"[STOP]";

/// Serialize `value` and append the sentinel, ready to write to the wire.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut body = serde_json::to_vec(value).context(SerializeCtx)?;
    body.extend_from_slice(STOP_SENTINEL);
    Ok(body)
}

/// Write an encoded message to `writer` and flush it.
pub async fn write_message<W, T>(writer: &mut W, value: &T) -> CodecResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode(value)?;
    writer.write_all(&bytes).await.context(IoCtx)?;
    writer.flush().await.context(IoCtx)?;
    Ok(())
}

/// Read from `reader` one byte at a time until the sentinel is observed,
/// then deserialize everything before it. Byte-at-a-time matches the
/// teacher corpus's preference for explicit, unbuffered framing loops over
/// a length-prefixed protocol; it is fine here since messages are small and
/// framing happens once per connection.
pub async fn read_message<R, T>(reader: &mut R) -> CodecResult<T>
where
    R: tokio::io::AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await.context(IoCtx)?;
        if n == 0 {
            return StreamClosedCtx.fail();
        }
        buf.push(byte[0]);
        if buf.ends_with(STOP_SENTINEL) {
            buf.truncate(buf.len() - STOP_SENTINEL.len());
            break;
        }
    }
    serde_json::from_slice(&buf).map_err(|source| {
        let body = String::from_utf8_lossy(&buf).into_owned();
        DeserializeCtx { body }.into_error(source)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[tokio::test]
    async fn round_trips_a_request() {
        let req = Request::AllocateGpus {
            num_gpus: 2,
            exclusive: true,
            mem_size: Some(1024),
        };
        let mut bytes = encode(&req).unwrap();
        assert!(bytes.ends_with(STOP_SENTINEL));
        bytes.extend_from_slice(b"garbage-after-sentinel-is-ignored");

        let mut cursor = std::io::Cursor::new(bytes);
        let decoded: Request = read_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, req);
    }

    #[tokio::test]
    async fn surfaces_stream_closed_when_peer_hangs_up_early() {
        let mut cursor = std::io::Cursor::new(b"{\"type\":\"GetSystemInfo\"".to_vec());
        let result: CodecResult<Request> = read_message(&mut cursor).await;
        assert!(matches!(result, Err(crate::error::CodecError::StreamClosed)));
    }
}
