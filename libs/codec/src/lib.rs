//! # Lattice Protocol Codec
//!
//! ## Purpose
//!
//! The "rules of the wire" layer between pure data structures and transport
//! connections: this crate turns [`Envelope`] values into the MessagePack
//! bytes that travel on data topics, and payload bytes back into envelopes.
//!
//! The wire shape is a map with up to two keys: `"v"` carries the value,
//! `"t"` carries the optional production timestamp and is omitted entirely
//! when the publisher supplied none. Binary blobs use the MessagePack `bin`
//! family, timestamps travel as RFC 3339 text.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types  →  [codec]  →  device-service pipelines
//!     ↑            ↓                ↓
//! Pure Data    Wire Rules      Validation +
//! Structures   Encode/Decode   Transport Delegation
//! ```
//!
//! ## What This Crate Does NOT Contain
//!
//! - Schema validation (the device service checks values against mappings)
//! - Transport logic (sockets and sessions live behind the transport trait)

pub mod error;

pub use error::{CodecError, CodecResult};
pub use types::Envelope;

/// Encode an envelope to its wire bytes.
///
/// Uses named MessagePack serialization so the `"v"`/`"t"` keys appear
/// literally on the wire.
pub fn encode_envelope(envelope: &Envelope) -> CodecResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(envelope)?)
}

/// Decode payload bytes back into an envelope.
pub fn decode_envelope(payload: &[u8]) -> CodecResult<Envelope> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    Ok(rmp_serde::from_slice(payload)?)
}
