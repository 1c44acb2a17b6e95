//! Interface schema types.
//!
//! An [`Interface`] is one unit of the device's declared surface: a named,
//! versioned set of mappings, each binding an endpoint template to a declared
//! value type. Interfaces are deserialized from JSON schema files and
//! validated on construction — an `Interface` value in hand is always
//! internally consistent and carries its compiled [`EndpointAutomaton`].

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::endpoint::{parse_template, EndpointAutomaton, Segment};
use crate::value::ValueType;

/// Schema validation errors raised while constructing an [`Interface`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterfaceError {
    /// Interface name is empty or contains characters outside the schema
    /// alphabet.
    #[error("invalid interface name '{name}'")]
    InvalidName {
        /// The offending name
        name: String,
    },

    /// Interface declares no mappings.
    #[error("interface '{interface}' declares no mappings")]
    NoMappings {
        /// The offending interface
        interface: String,
    },

    /// Endpoint template is syntactically malformed.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The offending template
        endpoint: String,
        /// What was wrong with it
        reason: String,
    },

    /// Two endpoint templates can accept the same concrete path with no
    /// literal segment to break the tie.
    #[error("mapping endpoint at position {index} overlaps an earlier template")]
    AmbiguousEndpoint {
        /// Position of the later of the two overlapping mappings
        index: usize,
    },
}

/// Who is authoritative for writing an interface's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// The device publishes; the server consumes.
    Device,
    /// The server publishes; the device consumes.
    Server,
}

/// Whether an interface carries a stream of timestamped events or a set of
/// persistent properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    /// Append-only timestamped events.
    Datastream,
    /// Last-value-wins persistent state.
    Properties,
}

/// Whether mappings are addressed one at a time or as one compound object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Each mapping is published on its own path.
    #[default]
    Individual,
    /// The whole interface is published as one object.
    Object,
}

/// One schema leaf: an endpoint template plus its declared value type.
#[derive(Debug, Clone, Deserialize)]
pub struct Mapping {
    /// `/`-delimited path template; segments are literals or `%{name}`
    /// parameters.
    pub endpoint: String,
    /// Declared value type for data published on this endpoint.
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Optional human-readable description from the schema file.
    #[serde(default)]
    pub description: Option<String>,
}

/// Raw schema-file shape, validated into an [`Interface`] by `TryFrom`.
#[derive(Debug, Deserialize)]
struct InterfaceDef {
    interface_name: String,
    version_major: u32,
    version_minor: u32,
    #[serde(rename = "type")]
    interface_type: InterfaceType,
    ownership: Ownership,
    #[serde(default)]
    aggregation: Aggregation,
    mappings: Vec<Mapping>,
}

/// A validated interface declaration.
///
/// Identity is the name; the version pair only distinguishes revisions of
/// the same interface. The endpoint automaton is compiled once here and
/// shared by clone (interfaces are cloned freely into sessions and
/// registries).
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "InterfaceDef")]
pub struct Interface {
    name: String,
    version_major: u32,
    version_minor: u32,
    interface_type: InterfaceType,
    ownership: Ownership,
    aggregation: Aggregation,
    mappings: Vec<Mapping>,
    automaton: Arc<EndpointAutomaton>,
}

impl TryFrom<InterfaceDef> for Interface {
    type Error = InterfaceError;

    fn try_from(def: InterfaceDef) -> Result<Self, Self::Error> {
        Interface::new(
            def.interface_name,
            def.version_major,
            def.version_minor,
            def.interface_type,
            def.ownership,
            def.aggregation,
            def.mappings,
        )
    }
}

impl Interface {
    /// Validate a schema declaration and compile its endpoint automaton.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        version_major: u32,
        version_minor: u32,
        interface_type: InterfaceType,
        ownership: Ownership,
        aggregation: Aggregation,
        mappings: Vec<Mapping>,
    ) -> Result<Self, InterfaceError> {
        if name.is_empty()
            || !name.starts_with(|c: char| c.is_ascii_alphabetic())
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(InterfaceError::InvalidName { name });
        }
        if mappings.is_empty() {
            return Err(InterfaceError::NoMappings { interface: name });
        }

        let templates: Vec<Vec<Segment>> = mappings
            .iter()
            .map(|m| parse_template(&m.endpoint))
            .collect::<Result<_, _>>()?;
        let automaton = EndpointAutomaton::build(&templates)?;

        Ok(Self {
            name,
            version_major,
            version_minor,
            interface_type,
            ownership,
            aggregation,
            mappings,
            automaton: Arc::new(automaton),
        })
    }

    /// Interface name (its identity).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Major version.
    pub fn version_major(&self) -> u32 {
        self.version_major
    }

    /// Minor version.
    pub fn version_minor(&self) -> u32 {
        self.version_minor
    }

    /// Datastream or properties.
    pub fn interface_type(&self) -> InterfaceType {
        self.interface_type
    }

    /// Device- or server-owned.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Individual or object aggregation.
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Declared mappings, in schema order.
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Resolve a concrete rooted path to its mapping.
    pub fn mapping_for_path(&self, path: &str) -> Option<&Mapping> {
        self.automaton.resolve(path).map(|i| &self.mappings[i])
    }

    /// Resolve a path already split into segments to its mapping.
    pub fn mapping_for_segments(&self, segments: &[&str]) -> Option<&Mapping> {
        self.automaton
            .resolve_segments(segments)
            .map(|i| &self.mappings[i])
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}.{}", self.name, self.version_major, self.version_minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "interface_name": "org.lattice.Temperature",
        "version_major": 1,
        "version_minor": 2,
        "type": "datastream",
        "ownership": "device",
        "mappings": [
            { "endpoint": "/room/%{name}/value", "type": "double" },
            { "endpoint": "/room/%{name}/unit", "type": "string", "description": "display unit" }
        ]
    }"#;

    #[test]
    fn deserializes_and_compiles_schema_json() {
        let iface: Interface = serde_json::from_str(SCHEMA).unwrap();
        assert_eq!(iface.name(), "org.lattice.Temperature");
        assert_eq!(iface.version_major(), 1);
        assert_eq!(iface.version_minor(), 2);
        assert_eq!(iface.interface_type(), InterfaceType::Datastream);
        assert_eq!(iface.ownership(), Ownership::Device);
        assert_eq!(iface.aggregation(), Aggregation::Individual);

        let mapping = iface.mapping_for_path("/room/kitchen/value").unwrap();
        assert_eq!(mapping.value_type, ValueType::Double);
        assert!(iface.mapping_for_path("/room/kitchen").is_none());
    }

    #[test]
    fn rejects_bad_interface_names() {
        for name in ["", "0starts.with.digit", "has space", "/slashed"] {
            let err = Interface::new(
                name.to_string(),
                1,
                0,
                InterfaceType::Datastream,
                Ownership::Device,
                Aggregation::Individual,
                vec![Mapping {
                    endpoint: "/v".to_string(),
                    value_type: ValueType::Integer,
                    description: None,
                }],
            )
            .unwrap_err();
            assert!(matches!(err, InterfaceError::InvalidName { .. }));
        }
    }

    #[test]
    fn rejects_empty_mapping_set() {
        let err = Interface::new(
            "org.lattice.Empty".to_string(),
            1,
            0,
            InterfaceType::Properties,
            Ownership::Device,
            Aggregation::Individual,
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, InterfaceError::NoMappings { .. }));
    }

    #[test]
    fn rejects_overlapping_templates_in_schema_json() {
        let schema = r#"{
            "interface_name": "org.lattice.Clash",
            "version_major": 0,
            "version_minor": 1,
            "type": "datastream",
            "ownership": "device",
            "mappings": [
                { "endpoint": "/a/%{x}", "type": "integer" },
                { "endpoint": "/a/%{y}", "type": "integer" }
            ]
        }"#;
        let err = serde_json::from_str::<Interface>(schema).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }
}
