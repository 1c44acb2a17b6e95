//! Transport collaborator contract.
//!
//! The core never opens sockets itself: session establishment and message
//! delivery go through these traits, and the production broker client lives
//! outside this crate. [`Transport::establish`] consumes the full credential
//! and subscription set computed by session bootstrap; the returned
//! [`TransportHandle`] is the live session the publish pipeline delegates to.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Session establishment failed.
    #[error("session establishment failed: {0}")]
    Establish(String),

    /// A publish was not accepted by the broker.
    #[error("publish on '{topic}' failed: {reason}")]
    Publish {
        /// Topic the publish targeted
        topic: String,
        /// Broker- or socket-level reason
        reason: String,
    },

    /// The underlying connection is gone.
    #[error("transport connection closed: {0}")]
    Closed(String),
}

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Qos {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged, possible duplicates.
    AtLeastOnce,
    /// Acknowledged, exactly once.
    ExactlyOnce,
}

impl Qos {
    /// Wire-level QoS number.
    pub fn as_u8(&self) -> u8 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }
}

/// One topic filter the session asks the broker to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Topic filter, possibly ending in a subtree wildcard.
    pub topic_filter: String,
}

impl Subscription {
    /// Subscription for a topic filter.
    pub fn new(topic_filter: impl Into<String>) -> Self {
        Self {
            topic_filter: topic_filter.into(),
        }
    }
}

/// Everything the transport needs to establish a device session.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Device client identifier (`realm/device_id`).
    pub client_id: String,
    /// Broker endpoint, from the pairing info response.
    pub broker_url: Url,
    /// PEM private key for mutual TLS.
    pub private_key_pem: String,
    /// PEM device certificate for mutual TLS.
    pub certificate_pem: String,
    /// Initial subscription set computed by session bootstrap.
    pub subscriptions: Vec<Subscription>,
    /// Accept TLS certificates that fail verification. Development only.
    pub ignore_tls_errors: bool,
}

/// Session factory: one `establish` per device connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a broker session and return the live handle.
    async fn establish(
        &self,
        params: ConnectParams,
    ) -> std::result::Result<Arc<dyn TransportHandle>, TransportError>;
}

/// A live broker session.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Deliver a payload on a topic, resolving once the requested QoS level
    /// is satisfied.
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
    ) -> std::result::Result<(), TransportError>;
}
