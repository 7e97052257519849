//! Codec trait and implementations for document (de)serialization.
//!
//! The store only sees bytes. A "codec" converts between those bytes and
//! the typed documents in this crate. Callers depend on the [`Codec`]
//! trait, so a binary format can replace JSON without touching the
//! controller.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode documents to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec is shared by the per-lobby
/// session task and the controller, which may run on different threads.
///
/// `decode` requires `DeserializeOwned` (not plain `Deserialize`) so the
/// decoded document owns its data and the store's buffer can be dropped.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a document into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a document.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected document shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps stored documents readable when inspecting the store by hand.
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use lobbysync_protocol::{Codec, JsonCodec, PresenceRecord};
///
/// let codec = JsonCodec;
/// let record = PresenceRecord { last_seen: 5000, is_online: true, name: "Ana".into() };
///
/// let bytes = codec.encode(&record).unwrap();
/// let decoded: PresenceRecord = codec.decode(&bytes).unwrap();
/// assert_eq!(record, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
