//! # Lattice Unified Types Library
//!
//! Schema and wire value types shared by every Lattice device-side crate.
//!
//! ## Design Philosophy
//!
//! - **Pure Data**: No I/O, no collaborator calls; everything here is a value
//! - **Validated Construction**: An [`Interface`] cannot exist in an invalid
//!   state — schema rules are enforced when the value is built, not when it
//!   is used
//! - **Compiled Resolution**: Endpoint templates are compiled once per
//!   interface into an [`EndpointAutomaton`]; resolving a concrete path costs
//!   time proportional to its depth, not to the mapping count
//! - **Closed Wire Vocabulary**: [`WireValue`] is the complete set of value
//!   shapes the protocol can carry; anything else is rejected before it
//!   reaches a socket
//!
//! ## Integration Points
//!
//! - **codec**: serializes [`Envelope`] values to the binary wire format
//! - **device-service**: validates publishes and inbound data against
//!   [`Interface`] declarations
//!
//! ## What This Crate Does NOT Contain
//!
//! - Envelope encoding/decoding (belongs in `codec`)
//! - Ownership/direction policy checks (belong in the device service)
//! - Schema file loading (the interface provider lives in the device service)

pub mod endpoint;
pub mod envelope;
pub mod interface;
pub mod value;

pub use endpoint::EndpointAutomaton;
pub use envelope::Envelope;
pub use interface::{
    Aggregation, Interface, InterfaceError, InterfaceType, Mapping, Ownership,
};
pub use value::{ValueType, WireValue};
