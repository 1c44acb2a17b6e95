//! Credential lifecycle: keypair → CSR → signed certificate → expiry
//! tracking → renewal.
//!
//! The lifecycle is a state machine over three observable states, evaluated
//! from the credential store on demand — nothing here caches trust material
//! in memory. A certificate inside the 7-day near-expiry window is treated
//! exactly like a missing one, so renewal follows the same path as first
//! issuance: `generate_keypair` (or `ensure_csr`) → `request_certificate`.
//!
//! Persistence is two discrete store writes (`private_key`, then `csr`). If
//! the second write fails the store legitimately holds a key with no CSR;
//! the recovery path is [`Session::ensure_csr`], which rebuilds the CSR from
//! the stored key and never regenerates the key itself.

use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use thiserror::Error;
use tracing::{debug, info, warn};
use x509_parser::pem::parse_x509_pem;

use crate::error::{DeviceError, Result};
use crate::session::Session;
use config::KeyAlgorithm;

/// Certificates closer than this to expiry are treated as absent.
pub const NEAR_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

/// Storage key of one piece of trust material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// The device's PEM private key.
    PrivateKey,
    /// The PEM certificate signing request.
    Csr,
    /// The signed PEM device certificate.
    Certificate,
}

impl CredentialKind {
    /// Fixed storage key for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::PrivateKey => "private_key",
            CredentialKind::Csr => "csr",
            CredentialKind::Certificate => "certificate",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential store failures. Always classified permanent.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem-level failure.
    #[error("credential store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure.
    #[error("credential store failure: {0}")]
    Backend(String),
}

/// Persistence capability for trust material.
///
/// Fetches are idempotent reads; every save is a discrete, externally
/// durable step.
pub trait CredentialStore: Send + Sync {
    /// Whether a private key is present.
    fn has_keypair(&self) -> std::result::Result<bool, StoreError>;
    /// Read one credential, `None` when absent.
    fn fetch(&self, kind: CredentialKind) -> std::result::Result<Option<String>, StoreError>;
    /// Durably write one credential, replacing any previous value.
    fn save(&self, kind: CredentialKind, value: &str) -> std::result::Result<(), StoreError>;
}

/// Production store: one PEM file per credential under a directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Store rooted at `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, kind: CredentialKind) -> PathBuf {
        self.dir.join(format!("{}.pem", kind.as_str()))
    }
}

impl CredentialStore for FileCredentialStore {
    fn has_keypair(&self) -> std::result::Result<bool, StoreError> {
        Ok(self.path_for(CredentialKind::PrivateKey).is_file())
    }

    fn fetch(&self, kind: CredentialKind) -> std::result::Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(kind)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn save(&self, kind: CredentialKind, value: &str) -> std::result::Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(kind), value)?;
        Ok(())
    }
}

/// Observable credential lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// No private key stored; start with [`Session::generate_keypair`].
    NoKeypair,
    /// Keypair present, certificate absent, unreadable, or near expiry.
    NoCertificate,
    /// Valid certificate with more than the near-expiry margin remaining.
    Ready,
}

/// Seconds until the certificate expires, `None` when it cannot be parsed.
fn seconds_until_expiry(certificate_pem: &str) -> Option<i64> {
    let (_, pem) = parse_x509_pem(certificate_pem.as_bytes()).ok()?;
    let cert = pem.parse_x509().ok()?;
    Some(cert.validity().not_after.timestamp() - Utc::now().timestamp())
}

fn build_csr_pem(key: &KeyPair, common_name: &str) -> Result<String> {
    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| DeviceError::Keygen(e.to_string()))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    let csr = params
        .serialize_request(key)
        .map_err(|e| DeviceError::Keygen(e.to_string()))?;
    csr.pem().map_err(|e| DeviceError::Keygen(e.to_string()))
}

fn signature_algorithm(alg: KeyAlgorithm) -> &'static rcgen::SignatureAlgorithm {
    match alg {
        KeyAlgorithm::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
        KeyAlgorithm::EcdsaP384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        KeyAlgorithm::Ed25519 => &rcgen::PKCS_ED25519,
    }
}

impl Session {
    /// Evaluate the credential lifecycle state. Never fails: store errors
    /// and malformed certificates degrade to the matching "absent" state.
    pub fn credential_state(&self) -> CredentialState {
        match self.store().has_keypair() {
            Ok(true) => {}
            Ok(false) => return CredentialState::NoKeypair,
            Err(e) => {
                warn!(error = %e, "store failed answering has_keypair; assuming no keypair");
                return CredentialState::NoKeypair;
            }
        }

        let certificate = match self.store().fetch(CredentialKind::Certificate) {
            Ok(Some(pem)) => pem,
            Ok(None) => return CredentialState::NoCertificate,
            Err(e) => {
                warn!(error = %e, "certificate fetch failed; treating as absent");
                return CredentialState::NoCertificate;
            }
        };

        match seconds_until_expiry(&certificate) {
            Some(secs) if secs > NEAR_EXPIRY_SECS => CredentialState::Ready,
            Some(secs) => {
                info!(
                    seconds_left = secs,
                    "certificate at or past the near-expiry threshold; renewal required"
                );
                CredentialState::NoCertificate
            }
            None => {
                warn!("stored certificate is malformed; treating as absent");
                CredentialState::NoCertificate
            }
        }
    }

    /// Generate a fresh keypair and CSR and persist both.
    ///
    /// Two sequential store writes. A failure on the CSR write leaves a key
    /// with no CSR; recover with [`Session::ensure_csr`], not by calling
    /// this again.
    pub fn generate_keypair(&self) -> Result<Session> {
        let key = KeyPair::generate_for(signature_algorithm(self.key_algorithm()))
            .map_err(|e| DeviceError::Keygen(e.to_string()))?;
        let csr_pem = build_csr_pem(&key, self.client_id())?;

        self.store()
            .save(CredentialKind::PrivateKey, &key.serialize_pem())?;
        self.store().save(CredentialKind::Csr, &csr_pem)?;

        info!(client_id = self.client_id(), "generated device keypair and CSR");
        Ok(self.clone())
    }

    /// Rebuild and persist the CSR from the stored private key if it is
    /// missing. The key itself is never replaced.
    pub fn ensure_csr(&self) -> Result<Session> {
        if self.store().fetch(CredentialKind::Csr)?.is_some() {
            return Ok(self.clone());
        }

        let key_pem = self
            .store()
            .fetch(CredentialKind::PrivateKey)?
            .ok_or(DeviceError::MissingCredential {
                kind: CredentialKind::PrivateKey,
            })?;
        let key = KeyPair::from_pem(&key_pem)
            .map_err(|e| DeviceError::InvalidKeyMaterial(e.to_string()))?;
        let csr_pem = build_csr_pem(&key, self.client_id())?;
        self.store().save(CredentialKind::Csr, &csr_pem)?;

        info!(client_id = self.client_id(), "rebuilt CSR from stored key");
        Ok(self.clone())
    }

    /// Submit the stored CSR to the pairing API and persist the signed
    /// certificate it returns.
    pub async fn request_certificate(&self) -> Result<Session> {
        let csr = self
            .store()
            .fetch(CredentialKind::Csr)?
            .ok_or(DeviceError::MissingCredential {
                kind: CredentialKind::Csr,
            })?;

        let certificate = self
            .pairing()
            .request_certificate(self.device_id(), &csr)
            .await?;
        self.store()
            .save(CredentialKind::Certificate, &certificate)?;

        info!(client_id = self.client_id(), "device certificate issued and stored");
        Ok(self.clone())
    }

    /// Fetch device info from the pairing API and record the broker URL.
    pub async fn request_info(&self) -> Result<Session> {
        let info = self.pairing().request_info(self.device_id()).await?;
        debug!(broker_url = %info.broker_url, "pairing info received");
        Ok(self.with_broker_url(info.broker_url))
    }
}
