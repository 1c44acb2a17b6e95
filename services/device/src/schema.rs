//! Interface schema provider: the device's declared surface.
//!
//! The core resolves every publish and every inbound message against the
//! interfaces this provider knows. [`InterfaceRegistry`] is the production
//! implementation: a fixed, name-ordered set loaded from JSON schema files
//! (or handed in programmatically), so iteration order — and with it the
//! introspection string — is deterministic for a given schema set.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use types::{Interface, InterfaceError, Ownership};

/// Errors raised while building an [`InterfaceRegistry`].
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema directory could not be read.
    #[error("failed to read interface directory: {0}")]
    Io(#[from] std::io::Error),

    /// A schema file is not valid interface JSON.
    #[error("failed to parse interface schema {path}: {reason}")]
    Parse {
        /// File the parser rejected
        path: String,
        /// Parser or validation failure
        reason: String,
    },

    /// An interface declaration failed validation.
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    /// Two schema sources declare the same interface name.
    #[error("duplicate interface '{interface}'")]
    Duplicate {
        /// The doubly declared name
        interface: String,
    },
}

/// Read capability over the device's declared interface set.
pub trait InterfaceProvider: Send + Sync {
    /// Look up one interface by name.
    fn fetch_interface(&self, name: &str) -> Option<Interface>;
    /// Every declared interface, in stable order.
    fn all_interfaces(&self) -> Vec<Interface>;
    /// The subset the server is authoritative for.
    fn server_owned_interfaces(&self) -> Vec<Interface>;
}

/// Fixed, name-ordered interface set.
#[derive(Debug, Clone, Default)]
pub struct InterfaceRegistry {
    interfaces: BTreeMap<String, Interface>,
}

impl InterfaceRegistry {
    /// Registry over an in-memory interface set.
    pub fn from_interfaces(
        interfaces: impl IntoIterator<Item = Interface>,
    ) -> Result<Self, SchemaError> {
        let mut map = BTreeMap::new();
        for interface in interfaces {
            let name = interface.name().to_string();
            if map.insert(name.clone(), interface).is_some() {
                return Err(SchemaError::Duplicate { interface: name });
            }
        }
        Ok(Self { interfaces: map })
    }

    /// Registry loaded from every `.json` file in a directory.
    pub fn from_dir(dir: &Path) -> Result<Self, SchemaError> {
        let mut interfaces = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let body = std::fs::read_to_string(&path)?;
            let interface: Interface =
                serde_json::from_str(&body).map_err(|e| SchemaError::Parse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            debug!(interface = %interface, path = %path.display(), "loaded interface schema");
            interfaces.push(interface);
        }

        let registry = Self::from_interfaces(interfaces)?;
        info!(count = registry.len(), "interface registry loaded");
        Ok(registry)
    }

    /// Number of declared interfaces.
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

impl InterfaceProvider for InterfaceRegistry {
    fn fetch_interface(&self, name: &str) -> Option<Interface> {
        self.interfaces.get(name).cloned()
    }

    fn all_interfaces(&self) -> Vec<Interface> {
        self.interfaces.values().cloned().collect()
    }

    fn server_owned_interfaces(&self) -> Vec<Interface> {
        self.interfaces
            .values()
            .filter(|i| i.ownership() == Ownership::Server)
            .cloned()
            .collect()
    }
}
