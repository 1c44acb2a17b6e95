//! Pairing API client: certificate issuance and device info.
//!
//! The pairing service is the realm-side authority that signs device CSRs
//! and tells devices where their broker lives. The core only sees the
//! [`PairingApi`] trait; [`RestPairingClient`] is the production HTTP
//! implementation. Failures map onto [`PairingError`] variants shaped for
//! the retry classifier: connection-level problems and 5xx responses are the
//! retryable ones, everything else is terminal.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Protocol descriptor key the device looks up in the info response.
pub const PROTOCOL_NAME: &str = "lattice_mqtt_v1";

/// Pairing API failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    /// Could not reach the pairing service (refused, unreachable, timed
    /// out, or dropped mid-exchange).
    #[error("connection to pairing API failed: {0}")]
    Connection(String),

    /// Transport-level failure other than a connection problem.
    #[error("pairing API transport failure: {0}")]
    Transport(String),

    /// The pairing service answered with a non-success status.
    #[error("pairing API returned status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The response arrived but violates the API schema.
    #[error("pairing API response is malformed: {0}")]
    MalformedResponse(String),
}

/// Parsed payload of a device-info response.
#[derive(Debug, Clone)]
pub struct TransportInfo {
    /// Broker endpoint the device should connect to.
    pub broker_url: Url,
}

/// Certificate issuance and device info, as the core consumes them.
#[async_trait]
pub trait PairingApi: Send + Sync {
    /// Submit a CSR; returns the signed PEM certificate.
    async fn request_certificate(
        &self,
        device_id: &str,
        csr: &str,
    ) -> std::result::Result<String, PairingError>;

    /// Fetch device info, including the broker URL.
    async fn request_info(
        &self,
        device_id: &str,
    ) -> std::result::Result<TransportInfo, PairingError>;
}

#[derive(Serialize)]
struct CertificateRequest<'a> {
    data: CsrData<'a>,
}

#[derive(Serialize)]
struct CsrData<'a> {
    csr: &'a str,
}

#[derive(Deserialize)]
struct CertificateResponse {
    data: CertificateData,
}

#[derive(Deserialize)]
struct CertificateData {
    certificate: String,
}

#[derive(Deserialize)]
struct InfoResponse {
    data: InfoData,
}

#[derive(Deserialize)]
struct InfoData {
    #[serde(default)]
    protocols: HashMap<String, ProtocolDescriptor>,
}

#[derive(Deserialize)]
struct ProtocolDescriptor {
    #[serde(default)]
    broker_url: Option<Url>,
}

/// Production pairing client over HTTP.
#[derive(Debug, Clone)]
pub struct RestPairingClient {
    http: reqwest::Client,
    base_url: Url,
    realm: String,
    secret: String,
}

impl RestPairingClient {
    /// Client for one realm, authenticating with the device's credential
    /// secret.
    pub fn new(base_url: Url, realm: impl Into<String>, secret: impl Into<String>) -> Self {
        let mut base_url = base_url;
        // Url::join drops the last path segment without this.
        if !base_url.path().ends_with('/') {
            let fixed = format!("{}/", base_url.path());
            base_url.set_path(&fixed);
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            realm: realm.into(),
            secret: secret.into(),
        }
    }

    fn device_endpoint(&self, device_id: &str, suffix: &str) -> Result<Url, PairingError> {
        self.base_url
            .join(&format!(
                "v1/{}/devices/{}{}",
                self.realm, device_id, suffix
            ))
            .map_err(|e| PairingError::MalformedResponse(format!("bad endpoint: {}", e)))
    }
}

fn map_transport_error(err: reqwest::Error) -> PairingError {
    // is_request covers connections dropped after establishment but before
    // the response line; both belong to the retryable connection class.
    if err.is_connect() || err.is_timeout() || err.is_request() {
        PairingError::Connection(err.to_string())
    } else {
        PairingError::Transport(err.to_string())
    }
}

#[async_trait]
impl PairingApi for RestPairingClient {
    async fn request_certificate(
        &self,
        device_id: &str,
        csr: &str,
    ) -> std::result::Result<String, PairingError> {
        let url = self.device_endpoint(device_id, "/credentials")?;
        debug!(%url, "requesting device certificate");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.secret)
            .json(&CertificateRequest {
                data: CsrData { csr },
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PairingError::Status {
                status: status.as_u16(),
            });
        }

        let parsed: CertificateResponse = response
            .json()
            .await
            .map_err(|e| PairingError::MalformedResponse(e.to_string()))?;
        Ok(parsed.data.certificate)
    }

    async fn request_info(
        &self,
        device_id: &str,
    ) -> std::result::Result<TransportInfo, PairingError> {
        let url = self.device_endpoint(device_id, "")?;
        debug!(%url, "requesting device info");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.secret)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PairingError::Status {
                status: status.as_u16(),
            });
        }

        let parsed: InfoResponse = response
            .json()
            .await
            .map_err(|e| PairingError::MalformedResponse(e.to_string()))?;
        let broker_url = parsed
            .data
            .protocols
            .get(PROTOCOL_NAME)
            .and_then(|p| p.broker_url.clone())
            .ok_or_else(|| {
                PairingError::MalformedResponse(format!(
                    "info response carries no broker URL for protocol '{}'",
                    PROTOCOL_NAME
                ))
            })?;

        Ok(TransportInfo { broker_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeviceError, RetryClass};

    fn client(server: &mockito::ServerGuard) -> RestPairingClient {
        RestPairingClient::new(
            Url::parse(&server.url()).unwrap(),
            "factory7",
            "s3cret",
        )
    }

    #[tokio::test]
    async fn issues_a_certificate_on_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/factory7/devices/press-line-3/credentials")
            .match_header("authorization", "Bearer s3cret")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"certificate":"-----BEGIN CERTIFICATE-----..."}}"#)
            .create_async()
            .await;

        let cert = client(&server)
            .request_certificate("press-line-3", "-----BEGIN CERTIFICATE REQUEST-----...")
            .await
            .unwrap();
        assert!(cert.starts_with("-----BEGIN CERTIFICATE-----"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_classify_temporary() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/factory7/devices/press-line-3/credentials")
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server)
            .request_certificate("press-line-3", "csr")
            .await
            .unwrap_err();
        assert_eq!(err, PairingError::Status { status: 503 });
        assert!(DeviceError::from(err).is_temporary());
    }

    #[tokio::test]
    async fn client_errors_classify_permanent_and_generic() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/factory7/devices/press-line-3/credentials")
            .with_status(404)
            .with_body(r#"{"errors":{"detail":"device not registered"}}"#)
            .create_async()
            .await;

        let err = client(&server)
            .request_certificate("press-line-3", "csr")
            .await
            .unwrap_err();
        match DeviceError::from(err).retry_class() {
            RetryClass::Permanent(reason) => {
                assert_eq!(reason, "request failed");
                assert!(!reason.contains("not registered"));
            }
            RetryClass::Temporary => panic!("4xx must be permanent"),
        }
    }

    #[tokio::test]
    async fn connection_refused_classifies_temporary() {
        // Nothing listens on this port.
        let unreachable = RestPairingClient::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            "factory7",
            "s3cret",
        );
        let err = unreachable
            .request_certificate("press-line-3", "csr")
            .await
            .unwrap_err();
        assert!(matches!(err, PairingError::Connection(_)));
        assert!(DeviceError::from(err).is_temporary());
    }

    #[tokio::test]
    async fn info_extracts_the_nested_broker_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/factory7/devices/press-line-3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":{"status":"confirmed","protocols":{"lattice_mqtt_v1":{"broker_url":"mqtts://broker.example.com:8883"}}}}"#,
            )
            .create_async()
            .await;

        let info = client(&server).request_info("press-line-3").await.unwrap();
        assert_eq!(info.broker_url.as_str(), "mqtts://broker.example.com:8883");
    }

    #[tokio::test]
    async fn info_without_broker_url_is_a_permanent_schema_violation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/factory7/devices/press-line-3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"protocols":{"other_protocol":{}}}}"#)
            .create_async()
            .await;

        let err = client(&server).request_info("press-line-3").await.unwrap_err();
        assert!(matches!(err, PairingError::MalformedResponse(_)));
        assert!(!DeviceError::from(err).is_temporary());
    }

    #[test]
    fn base_url_join_keeps_existing_path_prefixes() {
        let client = RestPairingClient::new(
            Url::parse("https://api.example.com/pairing").unwrap(),
            "factory7",
            "s3cret",
        );
        let url = client.device_endpoint("dev-1", "/credentials").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/pairing/v1/factory7/devices/dev-1/credentials"
        );
    }
}
