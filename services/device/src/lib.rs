//! # Lattice Device Service - Device-Side Protocol Core
//!
//! ## Purpose
//!
//! The device-side core of the Lattice telemetry protocol: owns the
//! device's cryptographic trust material, bootstraps the broker session,
//! and is the single authority on whether a publish or an incoming message
//! is well-formed with respect to the device's declared interface set.
//!
//! ## Integration Points
//!
//! - **Input Sources**: inbound broker messages, handed in as tokenized
//!   topics plus payload bytes
//! - **Output Destinations**: the broker session behind the
//!   [`Transport`]/[`TransportHandle`] traits
//! - **Pairing**: certificate issuance and device info over [`PairingApi`]
//!   (production: [`RestPairingClient`])
//! - **Persistence**: trust material behind [`CredentialStore`]
//!   (production: [`FileCredentialStore`])
//! - **Schema**: the declared interface set behind [`InterfaceProvider`]
//!   (production: [`InterfaceRegistry`])
//!
//! ## Architecture Role
//!
//! ```text
//! pairing API ──► credentials ──► session bootstrap ──► transport
//!                                      │
//! interface schemas ──► validation ────┤
//!                          │           ▼
//!            publish pipeline     dispatch pipeline ──► inbound channel
//! ```
//!
//! ## Concurrency Model
//!
//! One logical thread of control per device. The [`Session`] value is
//! threaded sequentially through operations and every mutating operation
//! returns a fresh session; nothing here shares mutable state. The single
//! asynchronous boundary is the bounded-channel handoff of validated
//! inbound data — fire and forget, at most once, per-device ordering only.
//!
//! ## Error Handling
//!
//! Every operation returns [`Result`]; nothing panics. Schema violations
//! are always permanent. Collaborator failures classify through
//! [`DeviceError::retry_class`] into [`RetryClass::Temporary`] (drive your
//! backoff loop) or [`RetryClass::Permanent`] (surface to the operator).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod credentials;
pub mod error;
pub mod input;
pub mod output;
pub mod pairing;
pub mod schema;
pub mod session;
pub mod test_utils;
pub mod transport;
mod validation;

pub use credentials::{
    CredentialKind, CredentialState, CredentialStore, FileCredentialStore, StoreError,
    NEAR_EXPIRY_SECS,
};
pub use error::{DeviceError, Result, RetryClass};
pub use input::{DispatchOutcome, IncomingData};
pub use output::{PublishKind, PublishRequest};
pub use pairing::{PairingApi, PairingError, RestPairingClient, TransportInfo, PROTOCOL_NAME};
pub use schema::{InterfaceProvider, InterfaceRegistry, SchemaError};
pub use session::{Session, CONTROL_SEGMENT, DEFAULT_INBOUND_CAPACITY, EMPTY_CACHE_SEGMENT};
pub use transport::{
    ConnectParams, Qos, Subscription, Transport, TransportError, TransportHandle,
};

// Re-export the schema and wire types consumers handle directly.
pub use types::{
    Aggregation, Envelope, Interface, InterfaceError, InterfaceType, Mapping, Ownership,
    ValueType, WireValue,
};
