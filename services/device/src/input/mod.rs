//! Inbound message dispatch.
//!
//! [`Session::handle_message`] takes the already-tokenized topic of an
//! incoming broker message plus its payload, routes control traffic, and
//! runs server-owned data through the same schema validation the publish
//! pipeline uses. Valid data is forwarded to the consumer over a bounded
//! channel as a fire-and-forget handoff: at most once, no acknowledgment,
//! ordering preserved per device only. A message is lost if the consumer is
//! gone or its queue is full — that loss is accepted protocol behavior, not
//! an error.
//!
//! Routing anomalies (foreign topic prefixes, the device's own control
//! echo) are logged and swallowed; schema violations are returned to the
//! caller verbatim.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use types::WireValue;

use crate::error::{DeviceError, Result};
use crate::session::{Session, CONTROL_SEGMENT, EMPTY_CACHE_SEGMENT};
use crate::validation;

/// One validated server-owned data message, as handed to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingData {
    /// Interface the data arrived on.
    pub interface: String,
    /// Rooted path below the interface.
    pub path: String,
    /// The decoded value.
    pub value: WireValue,
    /// Production timestamp from the envelope, when the sender supplied one.
    pub timestamp: Option<DateTime<Utc>>,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Valid data, forwarded to the consumer.
    Forwarded,
    /// Valid data, but the consumer is gone or saturated; dropped.
    Dropped,
    /// Control message accepted (currently a logging no-op).
    ControlHandled,
    /// The device's own empty-cache announcement, echoed back.
    SelfEcho,
    /// Foreign or unroutable topic; logged and ignored.
    Ignored,
}

impl Session {
    /// Route one inbound message.
    ///
    /// `tokens` are the `/`-separated topic segments; the first two must be
    /// this device's realm and identifier.
    pub fn handle_message(&self, tokens: &[&str], payload: &[u8]) -> Result<DispatchOutcome> {
        if tokens.len() < 3 || tokens[0] != self.realm() || tokens[1] != self.device_id() {
            warn!(topic = %tokens.join("/"), "message on unhandled topic dropped");
            return Ok(DispatchOutcome::Ignored);
        }

        let rest = &tokens[2..];
        if rest[0] == CONTROL_SEGMENT {
            return Ok(self.handle_control(&rest[1..]));
        }

        let interface_name = rest[0];
        let segments = &rest[1..];
        let path = format!("/{}", segments.join("/"));

        let interface = self
            .interfaces()
            .fetch_interface(interface_name)
            .ok_or_else(|| DeviceError::InterfaceNotFound {
                interface: interface_name.to_string(),
            })?;
        let mapping = validation::check_inbound(&interface, segments, &path)?;

        let envelope = codec::decode_envelope(payload)?;
        validation::check_value(mapping, &envelope.value, &path)?;

        let data = IncomingData {
            interface: interface_name.to_string(),
            path,
            value: envelope.value,
            timestamp: envelope.timestamp,
        };
        match self.inbound().try_send(data) {
            Ok(()) => Ok(DispatchOutcome::Forwarded),
            Err(e) => {
                warn!(error = %e, "inbound consumer unavailable; data message dropped");
                Ok(DispatchOutcome::Dropped)
            }
        }
    }

    fn handle_control(&self, control_path: &[&str]) -> DispatchOutcome {
        if control_path == [EMPTY_CACHE_SEGMENT] {
            // The broker echoes the device's own announcement back.
            debug!("own empty-cache announcement echoed back; acknowledged silently");
            return DispatchOutcome::SelfEcho;
        }
        info!(path = %control_path.join("/"), "control message received");
        DispatchOutcome::ControlHandled
    }
}
