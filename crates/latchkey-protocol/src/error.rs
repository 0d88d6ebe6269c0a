//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding entry payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a record failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload is not a valid record. Malformed JSON, missing fields,
    /// and half-set forwarding pointers all land here.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// A timestamp payload is not a decimal unix time.
    #[error("invalid timestamp payload {0:?}")]
    InvalidTimestamp(String),
}
