//! The device session: identity, capabilities, and bootstrap.
//!
//! A [`Session`] is an immutable-with-replace value: every mutating
//! operation hands back a fresh `Session` and the previous value stays
//! valid. Collaborators are injected once at construction — there is no
//! process-global lookup anywhere in the core — and the value is threaded
//! sequentially through the credential, publish, and dispatch operations.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use url::Url;

use crate::credentials::{CredentialKind, CredentialStore, FileCredentialStore};
use crate::error::{DeviceError, Result};
use crate::input::IncomingData;
use crate::pairing::{PairingApi, RestPairingClient};
use crate::schema::{InterfaceProvider, InterfaceRegistry};
use crate::transport::{ConnectParams, Subscription, Transport, TransportHandle};
use config::{DeviceConfig, KeyAlgorithm};

/// Bound of the inbound-data channel between dispatch and the consumer.
pub const DEFAULT_INBOUND_CAPACITY: usize = 128;

/// Reserved topic segment for protocol control messages.
pub const CONTROL_SEGMENT: &str = "control";

/// Control sub-path of the empty-cache announcement.
pub const EMPTY_CACHE_SEGMENT: &str = "emptyCache";

/// The device's working state.
#[derive(Clone)]
pub struct Session {
    realm: String,
    device_id: String,
    client_id: String,
    credentials_secret: String,
    pairing_url: Url,
    broker_url: Option<Url>,
    ignore_tls_errors: bool,
    key_algorithm: KeyAlgorithm,
    handle: Option<Arc<dyn TransportHandle>>,
    store: Arc<dyn CredentialStore>,
    interfaces: Arc<dyn InterfaceProvider>,
    pairing: Arc<dyn PairingApi>,
    transport: Arc<dyn Transport>,
    inbound: mpsc::Sender<IncomingData>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("broker_url", &self.broker_url)
            .field("connected", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session from configuration and explicit capability
    /// implementations.
    ///
    /// Returns the session plus the receiving end of the inbound-data
    /// channel; validated server-owned data arrives there as
    /// [`IncomingData`] values.
    pub fn new(
        config: &DeviceConfig,
        store: Arc<dyn CredentialStore>,
        interfaces: Arc<dyn InterfaceProvider>,
        pairing: Arc<dyn PairingApi>,
        transport: Arc<dyn Transport>,
    ) -> Result<(Session, mpsc::Receiver<IncomingData>)> {
        config
            .validate()
            .map_err(|e| DeviceError::Configuration(e.to_string()))?;

        let (inbound, receiver) = mpsc::channel(DEFAULT_INBOUND_CAPACITY);
        let session = Session {
            realm: config.realm.clone(),
            device_id: config.device_id.clone(),
            client_id: format!("{}/{}", config.realm, config.device_id),
            credentials_secret: config.credentials_secret.clone(),
            pairing_url: config.pairing_url.clone(),
            broker_url: None,
            ignore_tls_errors: config.ignore_tls_errors,
            key_algorithm: config.key_algorithm,
            handle: None,
            store,
            interfaces,
            pairing,
            transport,
            inbound,
        };
        Ok((session, receiver))
    }

    /// Build a session wired to the production collaborators: a file
    /// credential store under `store_dir`, an interface registry loaded
    /// from `interfaces_dir`, and the REST pairing client. The transport is
    /// still injected — broker clients live outside this crate.
    pub fn with_production_defaults(
        config: &DeviceConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<(Session, mpsc::Receiver<IncomingData>)> {
        let store = Arc::new(FileCredentialStore::new(&config.store_dir));
        let registry = match &config.interfaces_dir {
            Some(dir) => InterfaceRegistry::from_dir(dir)
                .map_err(|e| DeviceError::Configuration(e.to_string()))?,
            None => InterfaceRegistry::default(),
        };
        let pairing = Arc::new(RestPairingClient::new(
            config.pairing_url.clone(),
            config.realm.as_str(),
            config.credentials_secret.as_str(),
        ));
        Session::new(config, store, Arc::new(registry), pairing, transport)
    }

    /// Realm this device belongs to.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Device identifier within the realm.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Client identifier: `realm/device_id`, also the root topic.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Broker URL, present once `request_info` has run.
    pub fn broker_url(&self) -> Option<&Url> {
        self.broker_url.as_ref()
    }

    /// Pairing API base URL from configuration.
    pub fn pairing_url(&self) -> &Url {
        &self.pairing_url
    }

    /// Shared secret presented to the pairing API; available to callers
    /// wiring a custom pairing client.
    pub fn credentials_secret(&self) -> &str {
        &self.credentials_secret
    }

    /// Whether a live transport session is attached.
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Key algorithm used for newly generated keypairs.
    pub fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm
    }

    pub(crate) fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub(crate) fn interfaces(&self) -> &dyn InterfaceProvider {
        self.interfaces.as_ref()
    }

    pub(crate) fn pairing(&self) -> &dyn PairingApi {
        self.pairing.as_ref()
    }

    pub(crate) fn handle(&self) -> Result<&Arc<dyn TransportHandle>> {
        self.handle.as_ref().ok_or(DeviceError::NotConnected)
    }

    pub(crate) fn inbound(&self) -> &mpsc::Sender<IncomingData> {
        &self.inbound
    }

    /// New session with the broker URL recorded.
    pub(crate) fn with_broker_url(&self, broker_url: Url) -> Session {
        let mut next = self.clone();
        next.broker_url = Some(broker_url);
        next
    }

    /// The subscriptions a fresh session asks the broker for: the control
    /// subtree, plus root and subtree of every server-owned interface.
    pub fn initial_subscriptions(&self) -> Vec<Subscription> {
        let mut subscriptions = vec![Subscription::new(format!(
            "{}/{}/#",
            self.client_id, CONTROL_SEGMENT
        ))];
        for interface in self.interfaces.server_owned_interfaces() {
            subscriptions.push(Subscription::new(format!(
                "{}/{}",
                self.client_id,
                interface.name()
            )));
            subscriptions.push(Subscription::new(format!(
                "{}/{}/#",
                self.client_id,
                interface.name()
            )));
        }
        subscriptions
    }

    /// Establish the broker session.
    ///
    /// Requires trust material to already be fetchable and the broker URL
    /// to be known; this operation never triggers certificate issuance.
    pub async fn connect(&self) -> Result<Session> {
        let private_key_pem = self
            .store
            .fetch(CredentialKind::PrivateKey)?
            .ok_or(DeviceError::MissingCredential {
                kind: CredentialKind::PrivateKey,
            })?;
        let certificate_pem = self
            .store
            .fetch(CredentialKind::Certificate)?
            .ok_or(DeviceError::MissingCredential {
                kind: CredentialKind::Certificate,
            })?;
        let broker_url = self
            .broker_url
            .clone()
            .ok_or(DeviceError::MissingBrokerUrl)?;

        let subscriptions = self.initial_subscriptions();
        info!(
            client_id = %self.client_id,
            broker_url = %broker_url,
            subscriptions = subscriptions.len(),
            "establishing device session"
        );

        let params = ConnectParams {
            client_id: self.client_id.clone(),
            broker_url,
            private_key_pem,
            certificate_pem,
            subscriptions,
            ignore_tls_errors: self.ignore_tls_errors,
        };
        let handle = self.transport.establish(params).await?;

        let mut next = self.clone();
        next.handle = Some(handle);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{valid_certificate_pem, TestHarness};

    #[test]
    fn subscriptions_cover_control_and_server_owned_interfaces() {
        let harness = TestHarness::new();
        let filters: Vec<String> = harness
            .session
            .initial_subscriptions()
            .into_iter()
            .map(|s| s.topic_filter)
            .collect();

        assert_eq!(
            filters,
            [
                "factory7/press-line-3/control/#",
                "factory7/press-line-3/org.lattice.ServerSettings",
                "factory7/press-line-3/org.lattice.ServerSettings/#",
            ]
        );
    }

    #[tokio::test]
    async fn connect_requires_stored_trust_material() {
        let harness = TestHarness::new();
        let err = harness.session.connect().await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::MissingCredential {
                kind: CredentialKind::PrivateKey
            }
        ));
    }

    #[tokio::test]
    async fn connect_requires_a_broker_url() {
        let harness = TestHarness::new();
        harness.session.generate_keypair().unwrap();
        harness
            .store
            .save(CredentialKind::Certificate, &valid_certificate_pem(30))
            .unwrap();

        let err = harness.session.connect().await.unwrap_err();
        assert!(matches!(err, DeviceError::MissingBrokerUrl));
    }

    #[tokio::test]
    async fn connect_hands_the_full_credential_set_to_the_transport() {
        let harness = TestHarness::new();
        let session = harness.session.generate_keypair().unwrap();
        harness
            .store
            .save(CredentialKind::Certificate, &valid_certificate_pem(30))
            .unwrap();
        let session = session.request_info().await.unwrap();

        assert!(!session.is_connected());
        let session = session.connect().await.unwrap();
        assert!(session.is_connected());

        let params = harness.transport.last_connect().unwrap();
        assert_eq!(params.client_id, "factory7/press-line-3");
        assert!(params.private_key_pem.contains("PRIVATE KEY"));
        assert!(params.certificate_pem.contains("CERTIFICATE"));
        assert_eq!(params.subscriptions.len(), 3);
        assert!(!params.ignore_tls_errors);

        // The original session value is untouched.
        assert!(!harness.session.is_connected());
    }
}
