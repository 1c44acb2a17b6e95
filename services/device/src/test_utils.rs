//! Test doubles for the collaborator capabilities, plus a ready-made
//! harness wiring them into a session.
//!
//! One double per capability: [`MemoryCredentialStore`] (with save-failure
//! injection for partial-persistence tests), [`StubPairing`], and
//! [`RecordingTransport`]. The interface provider needs no double — the
//! production [`InterfaceRegistry`](crate::schema::InterfaceRegistry) is
//! constructed from in-memory interfaces directly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;
use url::Url;

use crate::credentials::{CredentialKind, CredentialStore, StoreError};
use crate::input::IncomingData;
use crate::pairing::{PairingApi, PairingError, TransportInfo};
use crate::schema::InterfaceRegistry;
use crate::session::Session;
use crate::transport::{ConnectParams, Qos, Transport, TransportError, TransportHandle};
use config::{DeviceConfig, KeyAlgorithm};
use types::{Aggregation, Interface, InterfaceType, Mapping, Ownership, ValueType};

/// In-memory credential store with save-failure injection.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<CredentialKind, String>>,
    failing_saves: Mutex<HashSet<CredentialKind>>,
}

impl MemoryCredentialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next save of `kind` fail once.
    pub fn fail_next_save(&self, kind: CredentialKind) {
        self.failing_saves.lock().insert(kind);
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn has_keypair(&self) -> Result<bool, StoreError> {
        Ok(self.values.lock().contains_key(&CredentialKind::PrivateKey))
    }

    fn fetch(&self, kind: CredentialKind) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(&kind).cloned())
    }

    fn save(&self, kind: CredentialKind, value: &str) -> Result<(), StoreError> {
        if self.failing_saves.lock().remove(&kind) {
            return Err(StoreError::Backend(format!(
                "injected save failure for '{}'",
                kind
            )));
        }
        self.values.lock().insert(kind, value.to_string());
        Ok(())
    }
}

/// Scripted pairing API.
pub struct StubPairing {
    certificate: Mutex<Option<String>>,
    broker_url: Mutex<Url>,
    failure: Mutex<Option<PairingError>>,
}

impl Default for StubPairing {
    fn default() -> Self {
        Self {
            certificate: Mutex::new(None),
            broker_url: Mutex::new(Url::parse("mqtts://broker.example.com/").unwrap()),
            failure: Mutex::new(None),
        }
    }
}

impl StubPairing {
    /// Stub answering with the default broker URL and no staged
    /// certificate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the certificate the next issuance call returns.
    pub fn issue_certificate(&self, certificate_pem: impl Into<String>) {
        *self.certificate.lock() = Some(certificate_pem.into());
    }

    /// Make every call fail with this error until cleared.
    pub fn fail_with(&self, error: PairingError) {
        *self.failure.lock() = Some(error);
    }
}

#[async_trait]
impl PairingApi for StubPairing {
    async fn request_certificate(
        &self,
        _device_id: &str,
        _csr: &str,
    ) -> Result<String, PairingError> {
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        self.certificate.lock().clone().ok_or_else(|| {
            PairingError::MalformedResponse("no certificate staged in stub".to_string())
        })
    }

    async fn request_info(&self, _device_id: &str) -> Result<TransportInfo, PairingError> {
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        Ok(TransportInfo {
            broker_url: self.broker_url.lock().clone(),
        })
    }
}

/// One message captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    /// Topic the publish targeted.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Requested delivery guarantee.
    pub qos: Qos,
}

/// Transport double recording connects and publishes.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    connects: Mutex<Vec<ConnectParams>>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
}

impl RecordingTransport {
    /// Fresh recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published through handles from this transport.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Parameters of the most recent establish call.
    pub fn last_connect(&self) -> Option<ConnectParams> {
        self.connects.lock().last().cloned()
    }
}

struct RecordingHandle {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn establish(
        &self,
        params: ConnectParams,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        self.connects.lock().push(params);
        Ok(Arc::new(RecordingHandle {
            published: Arc::clone(&self.published),
        }))
    }
}

#[async_trait]
impl TransportHandle for RecordingHandle {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
    ) -> Result<(), TransportError> {
        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }
}

/// Mapping literal for test schemas.
pub fn mapping(endpoint: &str, value_type: ValueType) -> Mapping {
    Mapping {
        endpoint: endpoint.to_string(),
        value_type,
        description: None,
    }
}

/// Minimal device-owned individual datastream interface.
pub fn datastream_interface(name: &str) -> Interface {
    Interface::new(
        name.to_string(),
        1,
        0,
        InterfaceType::Datastream,
        Ownership::Device,
        Aggregation::Individual,
        vec![mapping("/room/%{name}/value", ValueType::Double)],
    )
    .unwrap()
}

/// Minimal server-owned individual properties interface.
pub fn server_properties_interface(name: &str) -> Interface {
    Interface::new(
        name.to_string(),
        1,
        1,
        InterfaceType::Properties,
        Ownership::Server,
        Aggregation::Individual,
        vec![
            mapping("/limits/%{name}", ValueType::LongInteger),
            mapping("/enabled", ValueType::Boolean),
        ],
    )
    .unwrap()
}

/// The default schema set the harness registers.
pub fn test_interfaces() -> Vec<Interface> {
    vec![
        Interface::new(
            "org.lattice.Telemetry".to_string(),
            1,
            0,
            InterfaceType::Datastream,
            Ownership::Device,
            Aggregation::Individual,
            vec![
                mapping("/count", ValueType::Integer),
                mapping("/label", ValueType::String),
                mapping("/room/%{name}/value", ValueType::Double),
            ],
        )
        .unwrap(),
        Interface::new(
            "org.lattice.DeviceSettings".to_string(),
            0,
            1,
            InterfaceType::Properties,
            Ownership::Device,
            Aggregation::Individual,
            vec![mapping("/mode", ValueType::String)],
        )
        .unwrap(),
        Interface::new(
            "org.lattice.Snapshot".to_string(),
            2,
            1,
            InterfaceType::Datastream,
            Ownership::Device,
            Aggregation::Object,
            vec![
                mapping("/state/count", ValueType::Integer),
                mapping("/state/label", ValueType::String),
            ],
        )
        .unwrap(),
        server_properties_interface("org.lattice.ServerSettings"),
    ]
}

/// Self-signed PEM certificate valid for `valid_days` from now.
pub fn valid_certificate_pem(valid_days: i64) -> String {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::minutes(5);
    params.not_after = now + Duration::days(valid_days);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "factory7/press-line-3");
    params.distinguished_name = dn;
    params.self_signed(&key).unwrap().pem()
}

/// A session wired to fresh doubles, plus handles to inspect them.
pub struct TestHarness {
    /// The session under test.
    pub session: Session,
    /// Receiving end of the inbound-data channel.
    pub receiver: mpsc::Receiver<IncomingData>,
    /// The credential store double.
    pub store: Arc<MemoryCredentialStore>,
    /// The pairing double.
    pub pairing: Arc<StubPairing>,
    /// The transport double.
    pub transport: Arc<RecordingTransport>,
}

impl TestHarness {
    /// Harness over the default schema set.
    pub fn new() -> Self {
        Self::with_interfaces(test_interfaces())
    }

    /// Harness over a custom schema set.
    pub fn with_interfaces(interfaces: Vec<Interface>) -> Self {
        let config = DeviceConfig {
            realm: "factory7".to_string(),
            device_id: "press-line-3".to_string(),
            credentials_secret: "s3cret".to_string(),
            pairing_url: Url::parse("https://pairing.example.com").unwrap(),
            store_dir: "/unused".into(),
            interfaces_dir: None,
            ignore_tls_errors: false,
            key_algorithm: KeyAlgorithm::default(),
        };

        let store = Arc::new(MemoryCredentialStore::new());
        let pairing = Arc::new(StubPairing::new());
        let transport = Arc::new(RecordingTransport::new());
        let registry = InterfaceRegistry::from_interfaces(interfaces).unwrap();

        let (session, receiver) = Session::new(
            &config,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::new(registry),
            Arc::clone(&pairing) as Arc<dyn PairingApi>,
            Arc::clone(&transport) as Arc<dyn Transport>,
        )
        .unwrap();

        Self {
            session,
            receiver,
            store,
            pairing,
            transport,
        }
    }

    /// Harness whose session already completed provisioning and bootstrap.
    pub async fn connected() -> Self {
        Self::connected_with_interfaces(test_interfaces()).await
    }

    /// Connected harness over a custom schema set.
    pub async fn connected_with_interfaces(interfaces: Vec<Interface>) -> Self {
        let mut harness = Self::with_interfaces(interfaces);
        let session = harness.session.generate_keypair().unwrap();
        harness
            .store
            .save(CredentialKind::Certificate, &valid_certificate_pem(30))
            .unwrap();
        let session = session.request_info().await.unwrap();
        harness.session = session.connect().await.unwrap();
        harness
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
