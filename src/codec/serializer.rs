//! Serializer Module
//!
//! Turns cache values into bytes and back.

use std::fmt;

use crate::codec::CacheValue;
use crate::error::{CacheError, Result};

// == Serializer Kind ==
/// Serialization strategy applied before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializerKind {
    /// Scalars are stored as their raw bytes
    None,
    /// Self-describing JSON
    #[default]
    Generic,
    /// Compact binary (bincode)
    Compact,
}

impl SerializerKind {
    /// Parses a serializer name or legacy numeric id.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "0" => Ok(Self::None),
            "generic" | "php" | "json" | "1" => Ok(Self::Generic),
            "compact" | "igbinary" | "bincode" | "2" => Ok(Self::Compact),
            other => Err(CacheError::Config(format!("unknown serializer '{other}'"))),
        }
    }

    // == Serialize ==
    /// Serializes a value according to this strategy.
    ///
    /// Values that would not read back equal are rejected: non-finite floats
    /// for the structured serializers, anything but `Str` and `Bytes` for
    /// passthrough.
    pub fn serialize(self, value: &CacheValue) -> Result<Vec<u8>> {
        match self {
            Self::None => raw_bytes(value),
            Self::Generic => {
                ensure_finite(value)?;
                Ok(serde_json::to_vec(value)?)
            }
            Self::Compact => {
                ensure_finite(value)?;
                Ok(bincode::serialize(value)?)
            }
        }
    }

    // == Deserialize ==
    /// Reverses [`SerializerKind::serialize`].
    pub fn deserialize(self, bytes: &[u8]) -> Result<CacheValue> {
        match self {
            Self::None => Ok(match std::str::from_utf8(bytes) {
                Ok(s) => CacheValue::Str(s.to_string()),
                Err(_) => CacheValue::Bytes(bytes.to_vec()),
            }),
            Self::Generic => Ok(serde_json::from_slice(bytes)?),
            Self::Compact => Ok(bincode::deserialize(bytes)?),
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Generic => "generic",
            Self::Compact => "compact",
        };
        f.write_str(name)
    }
}

/// Passthrough encoding: only values that already are bytes.
fn raw_bytes(value: &CacheValue) -> Result<Vec<u8>> {
    match value {
        CacheValue::Str(s) => Ok(s.as_bytes().to_vec()),
        CacheValue::Bytes(b) => Ok(b.clone()),
        other => Err(CacheError::Codec(format!(
            "passthrough serializer only stores strings and bytes, got {}",
            kind_name(other)
        ))),
    }
}

/// NaN and infinities have no JSON form and never compare equal after a trip.
fn ensure_finite(value: &CacheValue) -> Result<()> {
    match value {
        CacheValue::Float(f) if !f.is_finite() => {
            Err(CacheError::Codec(format!("cannot store non-finite float {f}")))
        }
        CacheValue::List(items) => items.iter().try_for_each(ensure_finite),
        CacheValue::Map(entries) => entries.values().try_for_each(ensure_finite),
        _ => Ok(()),
    }
}

fn kind_name(value: &CacheValue) -> &'static str {
    match value {
        CacheValue::Null => "null",
        CacheValue::Bool(_) => "bool",
        CacheValue::Int(_) => "int",
        CacheValue::Float(_) => "float",
        CacheValue::Str(_) => "string",
        CacheValue::Bytes(_) => "bytes",
        CacheValue::List(_) => "list",
        CacheValue::Map(_) => "map",
    }
}
