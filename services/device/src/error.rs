//! Error types and the transient/permanent classifier for the device core.
//!
//! Two families live here. Schema violations (interface, ownership, path,
//! and type rules) are always permanent: retrying an invalid publish cannot
//! make it valid. Collaborator failures (pairing API, credential store,
//! transport) are classified through [`DeviceError::retry_class`], which
//! callers' backoff loops consume — `Temporary` is the only retryable
//! category.

use thiserror::Error;

use crate::credentials::{CredentialKind, StoreError};
use crate::pairing::PairingError;
use crate::transport::TransportError;
use types::ValueType;

/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Main error type for device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Named interface is not part of the device's declared set.
    #[error("interface '{interface}' is not registered on this device")]
    InterfaceNotFound {
        /// The interface that was requested
        interface: String,
    },

    /// A properties publish was attempted on a datastream interface.
    #[error("interface '{interface}' is a datastream interface")]
    DatastreamOnlyInterface {
        /// The mismatched interface
        interface: String,
    },

    /// A datastream publish was attempted on a properties interface.
    #[error("interface '{interface}' is a properties interface")]
    PropertiesOnlyInterface {
        /// The mismatched interface
        interface: String,
    },

    /// Devices may not publish into server-owned interfaces.
    #[error("interface '{interface}' is server-owned; publishing is not allowed")]
    ServerOwnedInterface {
        /// The server-owned interface
        interface: String,
    },

    /// Devices do not receive data on interfaces they own.
    #[error("interface '{interface}' is device-owned; incoming data rejected")]
    DeviceOwnedInterface {
        /// The device-owned interface
        interface: String,
    },

    /// The path does not resolve to any mapping endpoint.
    #[error("path '{path}' does not resolve on interface '{interface}'")]
    PathNotResolved {
        /// The interface whose automaton rejected the path
        interface: String,
        /// The unresolvable path
        path: String,
    },

    /// The value's shape does not conform to the mapping's declared type.
    #[error("value of type {actual} does not conform to declared type {declared} at '{path}'")]
    TypeMismatch {
        /// Path of the mapping being published or received
        path: String,
        /// The declared mapping type
        declared: ValueType,
        /// Shape of the offending value
        actual: &'static str,
    },

    /// Object-aggregated publishes still require a rooted, non-empty path.
    #[error("'{path}' is not a rooted object path")]
    MalformedPath {
        /// The malformed path
        path: String,
    },

    /// A required credential is not in the store.
    #[error("credential '{kind}' is not available in the store")]
    MissingCredential {
        /// Which credential was missing
        kind: CredentialKind,
    },

    /// The stored private key could not be parsed or used.
    #[error("stored private key is unusable: {0}")]
    InvalidKeyMaterial(String),

    /// Keypair or CSR generation failed.
    #[error("key material generation failed: {0}")]
    Keygen(String),

    /// `connect` was called before `request_info` populated the broker URL.
    #[error("broker URL unknown; run request_info before connect")]
    MissingBrokerUrl,

    /// A publish was attempted without a live transport session.
    #[error("no live transport session; connect first")]
    NotConnected,

    /// Session construction was handed invalid parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Pairing API failure, classified by [`DeviceError::retry_class`].
    #[error("pairing API call failed: {0}")]
    Pairing(#[from] PairingError),

    /// Credential store failure; always permanent.
    #[error("credential store failure: {0}")]
    Store(#[from] StoreError),

    /// Transport collaborator failure.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Envelope encoding/decoding failure.
    #[error("codec failure: {0}")]
    Codec(#[from] codec::CodecError),
}

/// Retry guidance attached to every failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryClass {
    /// Worth retrying after backoff.
    Temporary,
    /// Terminal for this operation; the reason is surfaced to the caller.
    Permanent(String),
}

impl RetryClass {
    /// Whether this failure is the retryable kind.
    pub fn is_temporary(&self) -> bool {
        matches!(self, RetryClass::Temporary)
    }
}

impl DeviceError {
    /// Classify this failure for the caller's retry loop.
    ///
    /// Schema violations and store failures are always permanent; only
    /// connection-level pairing failures and 5xx pairing responses are
    /// temporary. The 4xx case deliberately collapses to a generic reason so
    /// transport internals do not leak to callers.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            DeviceError::Pairing(e) => e.retry_class(),
            other => RetryClass::Permanent(other.to_string()),
        }
    }

    /// Shorthand for `retry_class().is_temporary()`.
    pub fn is_temporary(&self) -> bool {
        self.retry_class().is_temporary()
    }
}

impl PairingError {
    /// Classify a pairing failure per the protocol's retry table.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            PairingError::Connection(_) => RetryClass::Temporary,
            PairingError::Status { status } if (500..=599).contains(status) => {
                RetryClass::Temporary
            }
            PairingError::Status { status } if (400..=499).contains(status) => {
                RetryClass::Permanent("request failed".to_string())
            }
            other => RetryClass::Permanent(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_temporary() {
        let err = DeviceError::from(PairingError::Status { status: 503 });
        assert_eq!(err.retry_class(), RetryClass::Temporary);
        assert!(err.is_temporary());
    }

    #[test]
    fn client_errors_collapse_to_a_generic_permanent_reason() {
        let err = DeviceError::from(PairingError::Status { status: 404 });
        match err.retry_class() {
            RetryClass::Permanent(reason) => {
                assert_eq!(reason, "request failed");
                assert!(!reason.contains("404"));
            }
            RetryClass::Temporary => panic!("4xx must be permanent"),
        }
    }

    #[test]
    fn connection_failures_are_temporary() {
        let err = DeviceError::from(PairingError::Connection("refused".to_string()));
        assert!(err.is_temporary());
    }

    #[test]
    fn other_pairing_transport_failures_keep_their_reason() {
        let err = DeviceError::from(PairingError::Transport("tls alert".to_string()));
        match err.retry_class() {
            RetryClass::Permanent(reason) => assert!(reason.contains("tls alert")),
            RetryClass::Temporary => panic!("non-connection transport failures are permanent"),
        }
    }

    #[test]
    fn store_failures_are_permanent_with_original_reason() {
        let err = DeviceError::from(StoreError::Backend("disk full".to_string()));
        match err.retry_class() {
            RetryClass::Permanent(reason) => assert!(reason.contains("disk full")),
            RetryClass::Temporary => panic!("store failures are permanent"),
        }
    }

    #[test]
    fn schema_violations_are_permanent() {
        let err = DeviceError::InterfaceNotFound {
            interface: "org.lattice.Missing".to_string(),
        };
        assert!(!err.is_temporary());
    }
}
