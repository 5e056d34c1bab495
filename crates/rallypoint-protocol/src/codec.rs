//! Codec trait and the JSON implementation.
//!
//! A codec converts between Rust types and raw frame bytes. The relay only
//! talks to the [`Codec`] trait, so a binary codec could be dropped in
//! without touching the handler.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec instance lives in the
/// shared server state and is used from every connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Game-client overlays are typically scripted, so human-readable frames
/// are worth the extra bytes.
///
/// ```rust
/// use rallypoint_protocol::{ClientEvent, Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame = Envelope::new(1, 5000, ClientEvent::Heartbeat);
///
/// let bytes = codec.encode(&frame).unwrap();
/// let decoded: Envelope<ClientEvent> = codec.decode(&bytes).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
