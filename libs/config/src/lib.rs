//! # Lattice Device Configuration
//!
//! Loads the per-device configuration every Lattice service starts from:
//! identity (realm + device id), the pairing endpoint and credential secret,
//! where trust material and interface schemas live on disk, and the TLS and
//! key-generation knobs.
//!
//! Configuration comes from a TOML file with environment-variable overrides
//! (`LATTICE_*`), so deployments can keep secrets out of the file:
//!
//! ```toml
//! realm = "factory7"
//! device_id = "press-line-3"
//! credentials_secret = "..."
//! pairing_url = "https://pairing.example.com"
//! store_dir = "/var/lib/lattice/credentials"
//! interfaces_dir = "/etc/lattice/interfaces"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Asymmetric key algorithm used when generating the device keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    /// ECDSA over P-256 with SHA-256 (default).
    #[default]
    EcdsaP256,
    /// ECDSA over P-384 with SHA-384.
    EcdsaP384,
    /// Ed25519.
    Ed25519,
}

/// Everything a device needs to come up: identity, pairing credentials, and
/// local storage locations.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Realm this device belongs to.
    pub realm: String,

    /// Device identifier, unique within the realm.
    pub device_id: String,

    /// Shared secret presented to the pairing API.
    pub credentials_secret: String,

    /// Base URL of the pairing API.
    pub pairing_url: Url,

    /// Directory holding the device's trust material (key, CSR, certificate).
    pub store_dir: PathBuf,

    /// Directory of interface schema JSON files; `None` when interfaces are
    /// registered programmatically.
    #[serde(default)]
    pub interfaces_dir: Option<PathBuf>,

    /// Accept broker TLS certificates that fail verification. Development
    /// only.
    #[serde(default)]
    pub ignore_tls_errors: bool,

    /// Key algorithm for newly generated device keypairs.
    #[serde(default)]
    pub key_algorithm: KeyAlgorithm,
}

impl DeviceConfig {
    /// Sanity-check identity fields after deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.realm.is_empty() {
            bail!("realm must not be empty");
        }
        if self.device_id.is_empty() || self.device_id.contains('/') {
            bail!("device_id must be non-empty and must not contain '/'");
        }
        Ok(())
    }
}

/// Load a device configuration from a TOML file, with `LATTICE_*`
/// environment variables overriding individual keys
/// (e.g. `LATTICE_CREDENTIALS_SECRET`).
pub fn load_config(path: &Path) -> Result<DeviceConfig> {
    debug!(path = %path.display(), "loading device configuration");

    let settings = Config::builder()
        .add_source(File::from(path))
        .add_source(Environment::with_prefix("LATTICE"))
        .build()
        .with_context(|| format!("failed to read configuration from {}", path.display()))?;

    let config: DeviceConfig = settings
        .try_deserialize()
        .context("configuration is malformed")?;
    config.validate()?;
    Ok(config)
}
