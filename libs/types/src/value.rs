//! Wire values and the declared value types they are checked against.
//!
//! A [`WireValue`] is what actually travels inside an envelope; a
//! [`ValueType`] is what an interface mapping declares. The two meet in
//! [`WireValue::conforms_to`], which both the publish and dispatch pipelines
//! use as the single source of truth for type conformance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Declared value type of a mapping, as written in interface schema files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    LongInteger,
    /// 64-bit IEEE float
    Double,
    /// Boolean
    Boolean,
    /// UTF-8 string
    String,
    /// Opaque binary blob
    BinaryBlob,
    /// UTC timestamp
    DateTime,
    /// Array of 32-bit signed integers
    IntegerArray,
    /// Array of 64-bit signed integers
    LongIntegerArray,
    /// Array of 64-bit IEEE floats
    DoubleArray,
    /// Array of booleans
    BooleanArray,
    /// Array of UTF-8 strings
    StringArray,
    /// Array of opaque binary blobs
    BinaryBlobArray,
    /// Array of UTC timestamps
    DateTimeArray,
}

impl ValueType {
    /// Whether this declared type is one of the array forms.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ValueType::IntegerArray
                | ValueType::LongIntegerArray
                | ValueType::DoubleArray
                | ValueType::BooleanArray
                | ValueType::StringArray
                | ValueType::BinaryBlobArray
                | ValueType::DateTimeArray
        )
    }

    /// Schema-file spelling of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::LongInteger => "longinteger",
            ValueType::Double => "double",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::BinaryBlob => "binaryblob",
            ValueType::DateTime => "datetime",
            ValueType::IntegerArray => "integerarray",
            ValueType::LongIntegerArray => "longintegerarray",
            ValueType::DoubleArray => "doublearray",
            ValueType::BooleanArray => "booleanarray",
            ValueType::StringArray => "stringarray",
            ValueType::BinaryBlobArray => "binaryblobarray",
            ValueType::DateTimeArray => "datetimearray",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value as it appears on the wire.
///
/// Serialization is untagged: the wire representation carries no type
/// marker, only the MessagePack shape. Decoding classifies by that shape —
/// integers that fit 32 bits stay `Integer`, wider ones become `Long`,
/// RFC 3339 text becomes `DateTime`, `bin` payloads become `Binary`, and
/// sequences are unified element-wise into the typed array forms. The
/// declared mapping type arbitrates afterwards via
/// [`WireValue::conforms_to`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireValue {
    /// Boolean
    Boolean(bool),
    /// 32-bit signed integer
    Integer(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 64-bit IEEE float
    Double(f64),
    /// UTC timestamp (RFC 3339 text on the wire)
    DateTime(DateTime<Utc>),
    /// UTF-8 string
    String(String),
    /// Opaque binary blob (MessagePack `bin`)
    Binary(ByteBuf),
    /// Array of booleans
    BooleanArray(Vec<bool>),
    /// Array of 32-bit signed integers
    IntegerArray(Vec<i32>),
    /// Array of 64-bit signed integers
    LongArray(Vec<i64>),
    /// Array of 64-bit IEEE floats
    DoubleArray(Vec<f64>),
    /// Array of UTC timestamps
    DateTimeArray(Vec<DateTime<Utc>>),
    /// Array of UTF-8 strings
    StringArray(Vec<String>),
    /// Array of opaque binary blobs
    BinaryArray(Vec<ByteBuf>),
}

impl WireValue {
    /// Whether this value is one of the array forms.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            WireValue::BooleanArray(_)
                | WireValue::IntegerArray(_)
                | WireValue::LongArray(_)
                | WireValue::DoubleArray(_)
                | WireValue::DateTimeArray(_)
                | WireValue::StringArray(_)
                | WireValue::BinaryArray(_)
        )
    }

    /// Whether this value is an array with no elements.
    ///
    /// An empty array carries no element to inspect, so it conforms to every
    /// declared array type.
    pub fn is_empty_array(&self) -> bool {
        match self {
            WireValue::BooleanArray(v) => v.is_empty(),
            WireValue::IntegerArray(v) => v.is_empty(),
            WireValue::LongArray(v) => v.is_empty(),
            WireValue::DoubleArray(v) => v.is_empty(),
            WireValue::DateTimeArray(v) => v.is_empty(),
            WireValue::StringArray(v) => v.is_empty(),
            WireValue::BinaryArray(v) => v.is_empty(),
            _ => false,
        }
    }

    /// Check this value against a declared mapping type.
    ///
    /// `integer` values are accepted where `longinteger` is declared (the
    /// narrower shape widens losslessly); no other cross-type coercion is
    /// permitted. Arrays check the same rule element-wise.
    pub fn conforms_to(&self, declared: ValueType) -> bool {
        if self.is_empty_array() && declared.is_array() {
            return true;
        }
        matches!(
            (self, declared),
            (WireValue::Boolean(_), ValueType::Boolean)
                | (WireValue::Integer(_), ValueType::Integer)
                | (WireValue::Integer(_), ValueType::LongInteger)
                | (WireValue::Long(_), ValueType::LongInteger)
                | (WireValue::Double(_), ValueType::Double)
                | (WireValue::DateTime(_), ValueType::DateTime)
                | (WireValue::String(_), ValueType::String)
                | (WireValue::Binary(_), ValueType::BinaryBlob)
                | (WireValue::BooleanArray(_), ValueType::BooleanArray)
                | (WireValue::IntegerArray(_), ValueType::IntegerArray)
                | (WireValue::IntegerArray(_), ValueType::LongIntegerArray)
                | (WireValue::LongArray(_), ValueType::LongIntegerArray)
                | (WireValue::DoubleArray(_), ValueType::DoubleArray)
                | (WireValue::DateTimeArray(_), ValueType::DateTimeArray)
                | (WireValue::StringArray(_), ValueType::StringArray)
                | (WireValue::BinaryArray(_), ValueType::BinaryBlobArray)
        )
    }

    /// Human-readable name of this value's shape, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Boolean(_) => "boolean",
            WireValue::Integer(_) => "integer",
            WireValue::Long(_) => "longinteger",
            WireValue::Double(_) => "double",
            WireValue::DateTime(_) => "datetime",
            WireValue::String(_) => "string",
            WireValue::Binary(_) => "binaryblob",
            WireValue::BooleanArray(_) => "booleanarray",
            WireValue::IntegerArray(_) => "integerarray",
            WireValue::LongArray(_) => "longintegerarray",
            WireValue::DoubleArray(_) => "doublearray",
            WireValue::DateTimeArray(_) => "datetimearray",
            WireValue::StringArray(_) => "stringarray",
            WireValue::BinaryArray(_) => "binaryblobarray",
        }
    }
}

impl From<bool> for WireValue {
    fn from(v: bool) -> Self {
        WireValue::Boolean(v)
    }
}

impl From<i32> for WireValue {
    fn from(v: i32) -> Self {
        WireValue::Integer(v)
    }
}

impl From<i64> for WireValue {
    fn from(v: i64) -> Self {
        WireValue::Long(v)
    }
}

impl From<f64> for WireValue {
    fn from(v: f64) -> Self {
        WireValue::Double(v)
    }
}

impl From<&str> for WireValue {
    fn from(v: &str) -> Self {
        WireValue::String(v.to_string())
    }
}

impl From<String> for WireValue {
    fn from(v: String) -> Self {
        WireValue::String(v)
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(v: Vec<u8>) -> Self {
        WireValue::Binary(ByteBuf::from(v))
    }
}

impl From<DateTime<Utc>> for WireValue {
    fn from(v: DateTime<Utc>) -> Self {
        WireValue::DateTime(v)
    }
}

impl From<Vec<bool>> for WireValue {
    fn from(v: Vec<bool>) -> Self {
        WireValue::BooleanArray(v)
    }
}

impl From<Vec<i32>> for WireValue {
    fn from(v: Vec<i32>) -> Self {
        WireValue::IntegerArray(v)
    }
}

impl From<Vec<i64>> for WireValue {
    fn from(v: Vec<i64>) -> Self {
        WireValue::LongArray(v)
    }
}

impl From<Vec<f64>> for WireValue {
    fn from(v: Vec<f64>) -> Self {
        WireValue::DoubleArray(v)
    }
}

impl From<Vec<String>> for WireValue {
    fn from(v: Vec<String>) -> Self {
        WireValue::StringArray(v)
    }
}

impl From<Vec<DateTime<Utc>>> for WireValue {
    fn from(v: Vec<DateTime<Utc>>) -> Self {
        WireValue::DateTimeArray(v)
    }
}

impl From<Vec<Vec<u8>>> for WireValue {
    fn from(v: Vec<Vec<u8>>) -> Self {
        WireValue::BinaryArray(v.into_iter().map(ByteBuf::from).collect())
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(WireValueVisitor)
    }
}

struct WireValueVisitor;

impl<'de> serde::de::Visitor<'de> for WireValueVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a telemetry wire value")
    }

    fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(WireValue::Boolean(v))
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(match i32::try_from(v) {
            Ok(narrow) => WireValue::Integer(narrow),
            Err(_) => WireValue::Long(v),
        })
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
        match i64::try_from(v) {
            Ok(signed) => self.visit_i64(signed),
            Err(_) => Err(E::custom(format!("integer {} out of range", v))),
        }
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(WireValue::Double(v))
    }

    fn visit_f32<E: serde::de::Error>(self, v: f32) -> Result<Self::Value, E> {
        Ok(WireValue::Double(f64::from(v)))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        // RFC 3339 text is classified as a timestamp; the declared mapping
        // type arbitrates when a plain string was meant.
        Ok(match chrono::DateTime::parse_from_rfc3339(v) {
            Ok(ts) => WireValue::DateTime(ts.with_timezone(&Utc)),
            Err(_) => WireValue::String(v.to_string()),
        })
    }

    fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
        match chrono::DateTime::parse_from_rfc3339(&v) {
            Ok(ts) => Ok(WireValue::DateTime(ts.with_timezone(&Utc))),
            Err(_) => Ok(WireValue::String(v)),
        }
    }

    fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(WireValue::Binary(ByteBuf::from(v.to_vec())))
    }

    fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(WireValue::Binary(ByteBuf::from(v)))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<WireValue>()? {
            items.push(item);
        }
        classify_array(items)
    }
}

/// Unify decoded elements into one of the typed array forms.
///
/// Integers widen to `longinteger` when mixed with longs; timestamps fall
/// back to their RFC 3339 text when mixed with plain strings. Any other
/// heterogeneous combination is rejected — the protocol has no mixed-type
/// array.
fn classify_array<E: serde::de::Error>(items: Vec<WireValue>) -> Result<WireValue, E> {
    if items.is_empty() {
        return Ok(WireValue::BooleanArray(vec![]));
    }

    if items.iter().all(|i| matches!(i, WireValue::Boolean(_))) {
        return Ok(WireValue::BooleanArray(
            items
                .into_iter()
                .map(|i| match i {
                    WireValue::Boolean(b) => b,
                    _ => unreachable!(),
                })
                .collect(),
        ));
    }

    if items.iter().all(|i| matches!(i, WireValue::Integer(_))) {
        return Ok(WireValue::IntegerArray(
            items
                .into_iter()
                .map(|i| match i {
                    WireValue::Integer(n) => n,
                    _ => unreachable!(),
                })
                .collect(),
        ));
    }

    if items
        .iter()
        .all(|i| matches!(i, WireValue::Integer(_) | WireValue::Long(_)))
    {
        return Ok(WireValue::LongArray(
            items
                .into_iter()
                .map(|i| match i {
                    WireValue::Integer(n) => i64::from(n),
                    WireValue::Long(n) => n,
                    _ => unreachable!(),
                })
                .collect(),
        ));
    }

    if items.iter().all(|i| matches!(i, WireValue::Double(_))) {
        return Ok(WireValue::DoubleArray(
            items
                .into_iter()
                .map(|i| match i {
                    WireValue::Double(n) => n,
                    _ => unreachable!(),
                })
                .collect(),
        ));
    }

    if items.iter().all(|i| matches!(i, WireValue::DateTime(_))) {
        return Ok(WireValue::DateTimeArray(
            items
                .into_iter()
                .map(|i| match i {
                    WireValue::DateTime(ts) => ts,
                    _ => unreachable!(),
                })
                .collect(),
        ));
    }

    if items
        .iter()
        .all(|i| matches!(i, WireValue::String(_) | WireValue::DateTime(_)))
    {
        return Ok(WireValue::StringArray(
            items
                .into_iter()
                .map(|i| match i {
                    WireValue::String(s) => s,
                    WireValue::DateTime(ts) => ts.to_rfc3339(),
                    _ => unreachable!(),
                })
                .collect(),
        ));
    }

    if items.iter().all(|i| matches!(i, WireValue::Binary(_))) {
        return Ok(WireValue::BinaryArray(
            items
                .into_iter()
                .map(|i| match i {
                    WireValue::Binary(b) => b,
                    _ => unreachable!(),
                })
                .collect(),
        ));
    }

    Err(E::custom("heterogeneous array is not a protocol value"))
}
