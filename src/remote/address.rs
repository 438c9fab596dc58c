//! Server Address Module
//!
//! Parses the newline separated `server` option into connectable addresses.

use std::fmt;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{CacheError, Result};

/// Port used when an address omits one
pub const DEFAULT_PORT: u16 = 6379;

const TLS_SCHEME: &str = "tls://";

// == Server Address ==
/// One configured server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    Tcp { host: String, port: u16, tls: bool },
    Unix(PathBuf),
}

impl ServerAddress {
    // == Parse ==
    /// Parses a single address line.
    ///
    /// Accepts `host`, `host:port`, `[v6]:port`, `tls://host:port` and
    /// absolute unix socket paths. `force_tls` upgrades TCP addresses.
    pub fn parse(line: &str, force_tls: bool) -> Result<Self> {
        let line = line.trim();
        if line.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(line)));
        }

        let (rest, tls) = match line.strip_prefix(TLS_SCHEME) {
            Some(rest) => (rest, true),
            None => (line, force_tls),
        };

        let (host, port) = split_host_port(rest)?;
        if host.is_empty() {
            return Err(CacheError::Config(format!("missing host in '{line}'")));
        }

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
            tls,
        })
    }

    /// Returns true when the connection must be encrypted.
    pub fn uses_tls(&self) -> bool {
        matches!(self, Self::Tcp { tls: true, .. })
    }

    /// Connection URL understood by the redis client.
    pub fn to_url(&self) -> String {
        match self {
            Self::Tcp { host, port, tls } => {
                let scheme = if *tls { "rediss" } else { "redis" };
                if host.contains(':') {
                    format!("{scheme}://[{host}]:{port}/")
                } else {
                    format!("{scheme}://{host}:{port}/")
                }
            }
            Self::Unix(path) => format!("redis+unix://{}", path.display()),
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port, tls } => {
                let scheme = if *tls { TLS_SCHEME } else { "" };
                write!(f, "{scheme}{host}:{port}")
            }
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

fn split_host_port(input: &str) -> Result<(&str, u16)> {
    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| CacheError::Config(format!("unterminated IPv6 address '{input}'")))?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, parse_port(port, input)?)),
            None if tail.is_empty() => Ok((host, DEFAULT_PORT)),
            None => Err(CacheError::Config(format!("invalid address '{input}'"))),
        };
    }

    match input.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => Err(CacheError::Config(format!(
            "IPv6 address '{input}' must be bracketed"
        ))),
        Some((host, port)) => Ok((host, parse_port(port, input)?)),
        None => Ok((input, DEFAULT_PORT)),
    }
}

fn parse_port(port: &str, input: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| CacheError::Config(format!("invalid port in '{input}'")))
}

// == Parse Servers ==
/// Parses every non-blank line, skipping and reporting invalid ones.
pub fn parse_servers(list: &str, encryption: bool) -> (Vec<ServerAddress>, Vec<String>) {
    let mut addresses = Vec::new();
    let mut warnings = Vec::new();

    for line in list.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match ServerAddress::parse(line, encryption) {
            Ok(address) => addresses.push(address),
            Err(err) => {
                warn!(address = line, error = %err, "ignoring server address");
                warnings.push(err.to_string());
            }
        }
    }

    (addresses, warnings)
}
