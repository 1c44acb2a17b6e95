//! The wire envelope: every data payload travels as `{"v": value}` with an
//! optional `"t"` timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::WireValue;

/// Payload envelope carried on every data topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The published value.
    #[serde(rename = "v")]
    pub value: WireValue,
    /// Production timestamp, present only when the publisher supplied one.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Envelope with no explicit timestamp.
    pub fn new(value: WireValue) -> Self {
        Self {
            value,
            timestamp: None,
        }
    }

    /// Envelope with an explicit production timestamp.
    pub fn with_timestamp(value: WireValue, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            timestamp: Some(timestamp),
        }
    }
}

impl From<WireValue> for Envelope {
    fn from(value: WireValue) -> Self {
        Envelope::new(value)
    }
}
