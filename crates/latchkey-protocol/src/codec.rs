//! Codec trait and implementations for entry payloads.
//!
//! The session layer doesn't care how records are laid out in an entry;
//! it just needs something that implements [`Codec`]. [`JsonCodec`] is
//! the stored format every deployment uses today.
//!
//! Timestamp entries (remember-me ids, rate-limit keys) are not records;
//! their payload is a bare decimal unix time, handled by
//! [`encode_timestamp`] and [`decode_timestamp`].

use serde::{Serialize, de::DeserializeOwned};

use crate::{ProtocolError, UnixTime};

/// Encodes values to entry payloads and decodes them back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8])
    -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use latchkey_protocol::{Codec, JsonCodec, Lifetimes, Session};
///
/// let codec = JsonCodec;
/// let session = Session::new(None, Vec::new(), 1_700_000_000, Lifetimes::default());
///
/// let bytes = codec.encode(&session).unwrap();
/// let decoded: Session = codec.decode(&bytes).unwrap();
/// assert_eq!(session, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Timestamp payloads
// ---------------------------------------------------------------------------

/// Encodes a unix time as a decimal payload.
pub fn encode_timestamp(t: UnixTime) -> Vec<u8> {
    t.to_string().into_bytes()
}

/// Parses a decimal payload written by [`encode_timestamp`].
///
/// Surrounding whitespace is ignored.
pub fn decode_timestamp(data: &[u8]) -> Result<UnixTime, ProtocolError> {
    let text = String::from_utf8_lossy(data);
    text.trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidTimestamp(text.into_owned()))
}
