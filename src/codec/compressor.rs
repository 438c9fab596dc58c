//! Compressor Module
//!
//! Optional compression applied to serialized payloads.

use std::fmt;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{CacheError, Result};

/// zstd level used for cache payloads
pub const ZSTD_LEVEL: i32 = 3;

// == Compressor Kind ==
/// Compression strategy applied after serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressorKind {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl CompressorKind {
    /// Parses a compressor name or legacy numeric id.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "0" => Ok(Self::None),
            "gzip" | "deflate" | "1" => Ok(Self::Gzip),
            "zstd" | "2" => Ok(Self::Zstd),
            other => Err(CacheError::Config(format!("unknown compressor '{other}'"))),
        }
    }

    /// Returns true unless this is the passthrough compressor.
    pub fn is_active(self) -> bool {
        self != Self::None
    }

    // == Compress ==
    pub fn compress(self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&data)?;
                Ok(encoder.finish()?)
            }
            Self::Zstd => Ok(zstd::stream::encode_all(&data[..], ZSTD_LEVEL)?),
        }
    }

    // == Decompress ==
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
            Self::Zstd => Ok(zstd::stream::decode_all(data)?),
        }
    }
}

impl fmt::Display for CompressorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        };
        f.write_str(name)
    }
}
