//! Codec Module
//!
//! Serializer and compressor pipeline between cache values and the bytes
//! stored remotely. Encoding serializes then compresses; decoding reverses it.

mod compressor;
mod serializer;
mod value;

pub use compressor::{CompressorKind, ZSTD_LEVEL};
pub use serializer::SerializerKind;
pub use value::CacheValue;

use serde::Serialize;
use tracing::warn;

use crate::error::Result;

// == IO Bytes ==
/// Size of the last payload moved through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IoBytes {
    /// Only tracked when compression is on; otherwise measuring would mean
    /// serializing purely for accounting.
    NotSupported,
    Bytes(usize),
}

// == Codec ==
/// Resolved serializer and compressor pair for one store instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    pub serializer: SerializerKind,
    pub compressor: CompressorKind,
}

impl Codec {
    pub fn new(serializer: SerializerKind, compressor: CompressorKind) -> Self {
        Self {
            serializer,
            compressor,
        }
    }

    // == Resolve ==
    /// Builds a codec from configured names.
    ///
    /// Unknown names fall back to the passthrough stage; the problem is
    /// logged and returned as a warning string.
    pub fn resolve(serializer: &str, compressor: &str) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();

        let serializer = SerializerKind::parse(serializer).unwrap_or_else(|err| {
            warn!(error = %err, "falling back to passthrough serializer");
            warnings.push(err.to_string());
            SerializerKind::None
        });
        let compressor = CompressorKind::parse(compressor).unwrap_or_else(|err| {
            warn!(error = %err, "falling back to uncompressed payloads");
            warnings.push(err.to_string());
            CompressorKind::None
        });

        (Self::new(serializer, compressor), warnings)
    }

    /// Returns true when payloads are compressed.
    pub fn compresses(&self) -> bool {
        self.compressor.is_active()
    }

    // == Encode ==
    /// Serializes then compresses a value.
    pub fn encode(&self, value: &CacheValue) -> Result<Vec<u8>> {
        let serialized = self.serializer.serialize(value)?;
        self.compressor.compress(serialized)
    }

    // == Decode ==
    /// Decompresses then deserializes a payload.
    ///
    /// A missing payload short-circuits to `Ok(None)`.
    pub fn decode(&self, payload: Option<&[u8]>) -> Result<Option<CacheValue>> {
        let Some(bytes) = payload else {
            return Ok(None);
        };
        let serialized = self.compressor.decompress(bytes)?;
        self.serializer.deserialize(&serialized).map(Some)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    #[test]
    fn test_resolve_known_names() {
        let (codec, warnings) = Codec::resolve("compact", "zstd");
        assert_eq!(codec.serializer, SerializerKind::Compact);
        assert_eq!(codec.compressor, CompressorKind::Zstd);
        assert!(warnings.is_empty());
        assert!(codec.compresses());
    }

    #[test]
    fn test_resolve_unknown_falls_back() {
        let (codec, warnings) = Codec::resolve("yaml", "brotli");
        assert_eq!(codec, Codec::new(SerializerKind::None, CompressorKind::None));
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("yaml"));
        assert!(warnings[1].contains("brotli"));
    }

    #[test]
    fn test_decode_missing_short_circuits() {
        let codec = Codec::new(SerializerKind::Compact, CompressorKind::Gzip);
        assert_eq!(codec.decode(None).unwrap(), None);
    }

    #[test]
    fn test_encode_decode_all_pairs() {
        let value = CacheValue::from("hello world");
        for serializer in [
            SerializerKind::None,
            SerializerKind::Generic,
            SerializerKind::Compact,
        ] {
            for compressor in [CompressorKind::None, CompressorKind::Gzip, CompressorKind::Zstd] {
                let codec = Codec::new(serializer, compressor);
                let bytes = codec.encode(&value).unwrap();
                assert_eq!(codec.decode(Some(&bytes)).unwrap(), Some(value.clone()));
            }
        }
    }

    #[test]
    fn test_decode_uncompressed_payload_with_compressor_fails() {
        let plain = Codec::new(SerializerKind::Generic, CompressorKind::None);
        let zipped = Codec::new(SerializerKind::Generic, CompressorKind::Zstd);
        let bytes = plain.encode(&CacheValue::Int(1)).unwrap();
        assert!(matches!(
            zipped.decode(Some(&bytes)),
            Err(CacheError::Codec(_))
        ));
    }
}
