//! Envelope codec errors.

use thiserror::Error;

/// Errors raised while encoding or decoding wire envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope could not be serialized to MessagePack.
    #[error("envelope encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The payload bytes are not a well-formed envelope.
    #[error("envelope decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The payload was empty where an envelope was required.
    #[error("empty payload is not an envelope")]
    EmptyPayload,
}

/// Result type for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;
