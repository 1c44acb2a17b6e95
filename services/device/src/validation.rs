//! Schema validation shared by the publish and dispatch pipelines.
//!
//! All ownership, direction, aggregation, path, and type rules live here so
//! both pipelines reject malformed traffic identically. Checks short-circuit
//! in declaration order: direction before ownership, ownership before path,
//! path before value.

use types::{Aggregation, Interface, InterfaceType, Mapping, Ownership, WireValue};

use crate::error::{DeviceError, Result};
use crate::output::PublishKind;

/// Validate an outbound publish against its interface.
///
/// Returns the resolved mapping for individually aggregated interfaces;
/// object-aggregated interfaces get a path-syntax check only — per-field
/// validation of object payloads against member mappings is not implemented.
pub(crate) fn check_outbound<'a>(
    interface: &'a Interface,
    kind: PublishKind,
    path: &str,
    value: &WireValue,
) -> Result<Option<&'a Mapping>> {
    match (kind, interface.interface_type()) {
        (PublishKind::Datastream, InterfaceType::Properties) => {
            return Err(DeviceError::PropertiesOnlyInterface {
                interface: interface.name().to_string(),
            });
        }
        (PublishKind::Properties, InterfaceType::Datastream) => {
            return Err(DeviceError::DatastreamOnlyInterface {
                interface: interface.name().to_string(),
            });
        }
        _ => {}
    }

    if interface.ownership() != Ownership::Device {
        return Err(DeviceError::ServerOwnedInterface {
            interface: interface.name().to_string(),
        });
    }

    match interface.aggregation() {
        Aggregation::Individual => {
            let mapping = interface.mapping_for_path(path).ok_or_else(|| {
                DeviceError::PathNotResolved {
                    interface: interface.name().to_string(),
                    path: path.to_string(),
                }
            })?;
            check_value(mapping, value, path)?;
            Ok(Some(mapping))
        }
        Aggregation::Object => {
            check_object_path(path)?;
            Ok(None)
        }
    }
}

/// Validate an inbound message's interface and path.
///
/// Devices only receive data on server-owned interfaces; the path must
/// resolve to a declared mapping.
pub(crate) fn check_inbound<'a>(
    interface: &'a Interface,
    segments: &[&str],
    path: &str,
) -> Result<&'a Mapping> {
    if interface.ownership() != Ownership::Server {
        return Err(DeviceError::DeviceOwnedInterface {
            interface: interface.name().to_string(),
        });
    }
    interface
        .mapping_for_segments(segments)
        .ok_or_else(|| DeviceError::PathNotResolved {
            interface: interface.name().to_string(),
            path: path.to_string(),
        })
}

/// Check a value against a mapping's declared type.
pub(crate) fn check_value(mapping: &Mapping, value: &WireValue, path: &str) -> Result<()> {
    if value.conforms_to(mapping.value_type) {
        Ok(())
    } else {
        Err(DeviceError::TypeMismatch {
            path: path.to_string(),
            declared: mapping.value_type,
            actual: value.type_name(),
        })
    }
}

/// Object publishes still need a rooted path with no empty segments.
fn check_object_path(path: &str) -> Result<()> {
    let well_formed = path.starts_with('/')
        && !path.contains("//")
        && (path == "/" || !path.ends_with('/'));
    if well_formed {
        Ok(())
    } else {
        Err(DeviceError::MalformedPath {
            path: path.to_string(),
        })
    }
}
