//! Cache Value Module
//!
//! The logical value type stored through the codec pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// == Cache Value ==
/// A value held by the cache.
///
/// Externally tagged so that both the self-describing JSON serializer and the
/// compact bincode serializer can round-trip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<CacheValue>),
    Map(BTreeMap<String, CacheValue>),
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Str(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Str(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Int(value)
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        CacheValue::Float(value)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Bytes(value)
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(value: Vec<CacheValue>) -> Self {
        CacheValue::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(CacheValue::from(7i64), CacheValue::Int(7));
        assert_eq!(CacheValue::from(vec![1u8, 2]), CacheValue::Bytes(vec![1, 2]));
        assert_eq!(
            CacheValue::from(vec![CacheValue::from("a")]),
            CacheValue::List(vec![CacheValue::Str("a".to_string())])
        );
        assert_eq!(CacheValue::from(2.5), CacheValue::Float(2.5));
    }
}
