use crate::units::DisplayUnit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Current protocol version for the control handshake.
///
/// Incremented on any breaking change to the message set so that
/// mismatched peers fail the handshake instead of misbehaving.
pub const PROTOCOL_VERSION: u32 = 1;

/// Control messages exchanged before the data connections open.
///
/// All messages are serialized as JSON with a `type` field discriminator
/// and a 4-byte big-endian length prefix on the wire.
///
/// # Protocol flow
///
/// 1. Source sends `Setup` with the negotiated test parameters
/// 2. Sink responds with `SetupAck` (or `Error` to reject)
/// 3. Source opens the data connections; from then on the data path
///    carries only opaque payload bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Session parameters from source to sink
    Setup {
        version: u32,
        duration_secs: Option<u64>,
        byte_limit: Option<u64>,
        parallel: usize,
        unit: DisplayUnit,
    },

    /// Sink acknowledgment of the setup
    SetupAck { version: u32 },

    /// Rejection or failure notice
    Error { message: String },
}

impl Message {
    /// Creates a `Setup` message carrying the session parameters.
    pub fn setup(
        duration: Option<Duration>,
        byte_limit: Option<u64>,
        parallel: usize,
        unit: DisplayUnit,
    ) -> Self {
        Message::Setup {
            version: PROTOCOL_VERSION,
            duration_secs: duration.map(|d| d.as_secs()),
            byte_limit,
            parallel,
            unit,
        }
    }

    /// Creates a `SetupAck` message.
    pub fn setup_ack() -> Self {
        Message::SetupAck {
            version: PROTOCOL_VERSION,
        }
    }

    /// Creates an `Error` message.
    pub fn error(message: impl Into<String>) -> Self {
        Message::Error {
            message: message.into(),
        }
    }
}

/// Serializes a control message to length-prefixed JSON bytes.
///
/// The first 4 bytes are the JSON length as a big-endian u32, followed
/// by the UTF-8 encoded JSON body.
pub fn serialize_message(msg: &Message) -> crate::Result<Vec<u8>> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;
    let mut result = Vec::with_capacity(4 + json.len());
    result.extend_from_slice(&len.to_be_bytes());
    result.extend_from_slice(&json);
    Ok(result)
}

/// Deserializes a length-prefixed control message from an async reader.
///
/// # Errors
///
/// Returns an error if reading from the stream fails or the body is not
/// a valid message. Callers at the handshake boundary map both cases to
/// `Error::Handshake`.
pub async fn deserialize_message<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> crate::Result<Message> {
    use tokio::io::AsyncReadExt;

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    let mut json_bytes = vec![0u8; len];
    reader.read_exact(&mut json_bytes).await?;

    let msg = serde_json::from_slice(&json_bytes)?;
    Ok(msg)
}
