//! Outbound publish pipeline.
//!
//! Every value a device sends funnels through [`Session::publish`]:
//! interface lookup, schema validation, envelope construction, codec
//! encoding, topic computation, and synchronous delegation to the live
//! transport handle — short-circuiting on the first failure. The session
//! signals (`send_introspection`, `send_empty_cache`) are raw publishes that
//! bypass the envelope: their payloads are protocol literals, not data
//! values.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use types::{Envelope, WireValue};

use crate::error::{DeviceError, Result};
use crate::session::{Session, CONTROL_SEGMENT, EMPTY_CACHE_SEGMENT};
use crate::transport::Qos;
use crate::validation;

/// Payload announcing an empty server-owned property cache.
const EMPTY_CACHE_PAYLOAD: &[u8] = b"1";

/// Which publish surface a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishKind {
    /// Timestamped event on a datastream interface.
    Datastream,
    /// Property value on a properties interface.
    Properties,
}

/// One outbound publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Datastream or properties publish.
    pub kind: PublishKind,
    /// Target interface name.
    pub interface: String,
    /// Rooted path below the interface.
    pub path: String,
    /// The value to send.
    pub value: WireValue,
    /// Requested delivery guarantee; defaults per kind when absent.
    pub qos: Option<Qos>,
    /// Explicit production timestamp for the envelope's `t` field.
    pub timestamp: Option<DateTime<Utc>>,
}

impl PublishRequest {
    /// Datastream publish with default QoS and no explicit timestamp.
    pub fn datastream(
        interface: impl Into<String>,
        path: impl Into<String>,
        value: impl Into<WireValue>,
    ) -> Self {
        Self {
            kind: PublishKind::Datastream,
            interface: interface.into(),
            path: path.into(),
            value: value.into(),
            qos: None,
            timestamp: None,
        }
    }

    /// Properties publish with default QoS.
    pub fn property(
        interface: impl Into<String>,
        path: impl Into<String>,
        value: impl Into<WireValue>,
    ) -> Self {
        Self {
            kind: PublishKind::Properties,
            interface: interface.into(),
            path: path.into(),
            value: value.into(),
            qos: None,
            timestamp: None,
        }
    }

    /// Override the delivery guarantee.
    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = Some(qos);
        self
    }

    /// Attach an explicit production timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn default_qos(&self) -> Qos {
        match self.kind {
            PublishKind::Datastream => Qos::AtMostOnce,
            PublishKind::Properties => Qos::ExactlyOnce,
        }
    }
}

/// Topic for a data publish: the path is appended unless it is the
/// interface root (object-aggregated interfaces publish there directly).
fn data_topic(client_id: &str, interface: &str, path: &str) -> String {
    if path == "/" {
        format!("{}/{}", client_id, interface)
    } else {
        format!("{}/{}{}", client_id, interface, path)
    }
}

impl Session {
    /// Validate and send one value.
    pub async fn publish(&self, request: PublishRequest) -> Result<()> {
        let interface = self
            .interfaces()
            .fetch_interface(&request.interface)
            .ok_or_else(|| DeviceError::InterfaceNotFound {
                interface: request.interface.clone(),
            })?;
        let _mapping =
            validation::check_outbound(&interface, request.kind, &request.path, &request.value)?;

        // Transport availability is a precondition, checked before any
        // encoding work happens.
        let handle = self.handle()?.clone();

        let qos = request.qos.unwrap_or_else(|| request.default_qos());
        let envelope = match request.timestamp {
            Some(t) => Envelope::with_timestamp(request.value, t),
            None => Envelope::new(request.value),
        };
        let payload = codec::encode_envelope(&envelope)?;
        let topic = data_topic(self.client_id(), interface.name(), &request.path);

        debug!(topic = %topic, qos = qos.as_u8(), bytes = payload.len(), "publishing value");
        handle.publish(&topic, payload, qos).await?;
        Ok(())
    }

    /// Announce the device's interface set: `name:major:minor` entries
    /// joined by `;`, published on the root topic at exactly-once QoS.
    pub async fn send_introspection(&self) -> Result<()> {
        let manifest = self
            .interfaces()
            .all_interfaces()
            .iter()
            .map(|i| format!("{}:{}:{}", i.name(), i.version_major(), i.version_minor()))
            .collect::<Vec<_>>()
            .join(";");

        let handle = self.handle()?.clone();
        info!(manifest = %manifest, "sending introspection");
        handle
            .publish(self.client_id(), manifest.into_bytes(), Qos::ExactlyOnce)
            .await?;
        Ok(())
    }

    /// One-shot signal that the device holds no cached server-owned
    /// properties and wants everything resent.
    pub async fn send_empty_cache(&self) -> Result<()> {
        let handle = self.handle()?.clone();
        let topic = format!(
            "{}/{}/{}",
            self.client_id(),
            CONTROL_SEGMENT,
            EMPTY_CACHE_SEGMENT
        );
        debug!(topic = %topic, "announcing empty property cache");
        handle
            .publish(&topic, EMPTY_CACHE_PAYLOAD.to_vec(), Qos::ExactlyOnce)
            .await?;
        Ok(())
    }

    /// Resend device-owned properties after a session resume.
    pub async fn send_producer_properties(&self) -> Result<()> {
        // TODO: resend device-owned properties once a local property cache
        // exists to read them from.
        debug!("producer properties resend requested; nothing to send yet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestHarness;
    use chrono::TimeZone;
    use types::Interface;

    #[tokio::test]
    async fn publish_validates_before_checking_the_transport() {
        // Not connected, but the schema violation must win.
        let harness = TestHarness::new();
        let err = harness
            .session
            .publish(PublishRequest::datastream(
                "org.lattice.Telemetry",
                "/label",
                42i32,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::TypeMismatch { .. }));

        // A valid request without a live session stops before the codec.
        let err = harness
            .session
            .publish(PublishRequest::datastream(
                "org.lattice.Telemetry",
                "/count",
                42i32,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::NotConnected));
    }

    #[tokio::test]
    async fn publish_builds_topic_envelope_and_default_qos() {
        let harness = TestHarness::connected().await;
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        harness
            .session
            .publish(
                PublishRequest::datastream("org.lattice.Telemetry", "/room/kitchen/value", 21.5f64)
                    .with_timestamp(ts),
            )
            .await
            .unwrap();

        let published = harness.transport.published();
        let message = published.last().unwrap();
        assert_eq!(
            message.topic,
            "factory7/press-line-3/org.lattice.Telemetry/room/kitchen/value"
        );
        assert_eq!(message.qos, Qos::AtMostOnce);

        let envelope = codec::decode_envelope(&message.payload).unwrap();
        assert_eq!(envelope.value, WireValue::Double(21.5));
        assert_eq!(envelope.timestamp, Some(ts));
    }

    #[tokio::test]
    async fn property_publishes_default_to_exactly_once() {
        let harness = TestHarness::connected().await;
        harness
            .session
            .publish(PublishRequest::property(
                "org.lattice.DeviceSettings",
                "/mode",
                "eco",
            ))
            .await
            .unwrap();

        let published = harness.transport.published();
        assert_eq!(published.last().unwrap().qos, Qos::ExactlyOnce);
    }

    #[tokio::test]
    async fn object_publish_lands_on_the_interface_root_topic() {
        let harness = TestHarness::connected().await;
        harness
            .session
            .publish(PublishRequest::datastream("org.lattice.Snapshot", "/", 1i32))
            .await
            .unwrap();

        let published = harness.transport.published();
        assert_eq!(
            published.last().unwrap().topic,
            "factory7/press-line-3/org.lattice.Snapshot"
        );
    }

    #[tokio::test]
    async fn unknown_interface_is_reported_first() {
        let harness = TestHarness::connected().await;
        let err = harness
            .session
            .publish(PublishRequest::datastream("org.lattice.Nope", "/x", 1i32))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::InterfaceNotFound { .. }));
    }

    #[tokio::test]
    async fn introspection_is_deterministic_and_exactly_once() {
        let interfaces = vec![
            Interface::new(
                "a".to_string(),
                1,
                0,
                types::InterfaceType::Datastream,
                types::Ownership::Device,
                types::Aggregation::Individual,
                vec![crate::test_utils::mapping("/v", types::ValueType::Integer)],
            )
            .unwrap(),
            Interface::new(
                "b".to_string(),
                2,
                1,
                types::InterfaceType::Datastream,
                types::Ownership::Device,
                types::Aggregation::Individual,
                vec![crate::test_utils::mapping("/v", types::ValueType::Integer)],
            )
            .unwrap(),
        ];
        let harness = TestHarness::connected_with_interfaces(interfaces).await;
        harness.session.send_introspection().await.unwrap();

        let published = harness.transport.published();
        let message = published.last().unwrap();
        assert_eq!(message.topic, "factory7/press-line-3");
        assert_eq!(message.payload, b"a:1:0;b:2:1");
        assert_eq!(message.qos, Qos::ExactlyOnce);

        // Stable across calls for the same schema set.
        harness.session.send_introspection().await.unwrap();
        assert_eq!(harness.transport.published().last().unwrap().payload, b"a:1:0;b:2:1");
    }

    #[tokio::test]
    async fn empty_cache_signal_is_a_literal_on_the_control_topic() {
        let harness = TestHarness::connected().await;
        harness.session.send_empty_cache().await.unwrap();

        let published = harness.transport.published();
        let message = published.last().unwrap();
        assert_eq!(message.topic, "factory7/press-line-3/control/emptyCache");
        assert_eq!(message.payload, b"1");
        assert_eq!(message.qos, Qos::ExactlyOnce);
    }

    #[tokio::test]
    async fn producer_properties_placeholder_succeeds_and_sends_nothing() {
        let harness = TestHarness::connected().await;
        let before = harness.transport.published().len();
        harness.session.send_producer_properties().await.unwrap();
        assert_eq!(harness.transport.published().len(), before);
    }
}
