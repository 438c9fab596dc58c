//! Redis Connection Module
//!
//! Establishes a single node or cluster connection and implements the
//! [`RemoteBackend`] contract on top of it.

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{Client, Cmd, ConnectionInfo, FromRedisValue, IntoConnectionInfo, TlsCertificates};
use tracing::{debug, info};

use super::address::ServerAddress;
use super::RemoteBackend;
use crate::config::StoreConfig;
use crate::error::{RemoteError, RemoteResult};

#[derive(Clone)]
enum Connection {
    Single(MultiplexedConnection),
    Cluster(ClusterConnection),
}

// == Redis Backend ==
/// Live connection to one Redis node or a Redis cluster.
#[derive(Clone)]
pub struct RedisBackend {
    connection: Connection,
    prefix: String,
    timeout: Duration,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.connection {
            Connection::Single(_) => "single",
            Connection::Cluster(_) => "cluster",
        };
        f.debug_struct("RedisBackend")
            .field("mode", &mode)
            .field("prefix", &self.prefix)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// == Connect ==
/// Connects to `addresses` (parsed from `config.server` with
/// [`parse_servers`](super::parse_servers)) using the rest of `config`.
///
/// When encryption is enabled a `PING` is sent right away: the TLS handshake
/// is not flushed until data is exchanged, so the first real command could
/// otherwise race it.
pub async fn connect(
    config: &StoreConfig,
    addresses: &[ServerAddress],
) -> anyhow::Result<RedisBackend> {
    if addresses.is_empty() {
        bail!("no valid server address in {:?}", config.server);
    }

    let certificates = match &config.ca_file {
        Some(path) => {
            let pem = std::fs::read(path)
                .with_context(|| format!("reading CA file {}", path.display()))?;
            Some(TlsCertificates {
                client_tls: None,
                root_cert: Some(pem),
            })
        }
        None => None,
    };

    let timeout = config.connection_timeout();
    let connection = if config.cluster_mode {
        connect_cluster(config, addresses, certificates, timeout).await?
    } else {
        connect_single(config, &addresses[0], certificates, timeout).await?
    };

    let backend = RedisBackend {
        connection,
        prefix: config.key_prefix().to_string(),
        timeout,
    };

    if config.encryption {
        backend
            .ping()
            .await
            .context("completing TLS handshake")?;
    }

    info!(
        servers = addresses.len(),
        cluster = config.cluster_mode,
        tls = config.encryption,
        "connected to redis"
    );
    Ok(backend)
}

async fn connect_single(
    config: &StoreConfig,
    address: &ServerAddress,
    certificates: Option<TlsCertificates>,
    timeout: Duration,
) -> anyhow::Result<Connection> {
    let info = connection_info(address, config.password.as_deref())?;
    let client = match certificates {
        Some(certs) if address.uses_tls() => Client::build_with_tls(info, certs)?,
        _ => Client::open(info)?,
    };

    debug!(%address, "opening single node connection");
    let connection = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
        .await
        .map_err(|_| anyhow!("connecting to {address} timed out after {timeout:?}"))?
        .with_context(|| format!("connecting to {address}"))?;

    Ok(Connection::Single(connection))
}

async fn connect_cluster(
    config: &StoreConfig,
    addresses: &[ServerAddress],
    certificates: Option<TlsCertificates>,
    timeout: Duration,
) -> anyhow::Result<Connection> {
    let nodes = addresses
        .iter()
        .map(|address| connection_info(address, config.password.as_deref()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut builder = ClusterClientBuilder::new(nodes);
    if let Some(password) = &config.password {
        builder = builder.password(password.clone());
    }
    if config.encryption {
        builder = builder.tls(redis::TlsMode::Secure);
        if let Some(certs) = certificates {
            builder = builder.certs(certs);
        }
    }
    let client = builder.build()?;

    debug!(nodes = addresses.len(), "opening cluster connection");
    let connection = tokio::time::timeout(timeout, client.get_async_connection())
        .await
        .map_err(|_| anyhow!("connecting to cluster timed out after {timeout:?}"))?
        .context("connecting to cluster")?;

    Ok(Connection::Cluster(connection))
}

fn connection_info(address: &ServerAddress, password: Option<&str>) -> anyhow::Result<ConnectionInfo> {
    let mut info = address
        .to_url()
        .as_str()
        .into_connection_info()
        .with_context(|| format!("invalid server address {address}"))?;
    info.redis.password = password.map(str::to_string);
    Ok(info)
}

impl RedisBackend {
    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Runs a command with the per-call timeout.
    async fn query<T: FromRedisValue + Send>(&self, cmd: Cmd) -> RemoteResult<T> {
        let call = async {
            let reply: redis::RedisResult<T> = match &self.connection {
                Connection::Single(conn) => {
                    let mut conn = conn.clone();
                    cmd.query_async(&mut conn).await
                }
                Connection::Cluster(conn) => {
                    let mut conn = conn.clone();
                    cmd.query_async(&mut conn).await
                }
            };
            reply
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl RemoteBackend for RedisBackend {
    async fn hget(&self, key: &str, field: &str) -> RemoteResult<Option<Vec<u8>>> {
        let mut cmd = redis::cmd("HGET");
        cmd.arg(self.key(key)).arg(field);
        self.query(cmd).await
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> RemoteResult<Vec<Option<Vec<u8>>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(self.key(key)).arg(fields);
        self.query(cmd).await
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> RemoteResult<()> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.key(key)).arg(field).arg(value);
        let _: i64 = self.query(cmd).await?;
        Ok(())
    }

    async fn hset_multiple(&self, key: &str, pairs: Vec<(String, Vec<u8>)>) -> RemoteResult<usize> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let written = pairs.len();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.key(key));
        for (field, value) in pairs {
            cmd.arg(field).arg(value);
        }
        let _: i64 = self.query(cmd).await?;
        Ok(written)
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> RemoteResult<usize> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(self.key(key)).arg(fields);
        self.query(cmd).await
    }

    async fn hkeys(&self, key: &str) -> RemoteResult<Vec<String>> {
        let mut cmd = redis::cmd("HKEYS");
        cmd.arg(self.key(key));
        self.query(cmd).await
    }

    async fn hexists(&self, key: &str, field: &str) -> RemoteResult<bool> {
        let mut cmd = redis::cmd("HEXISTS");
        cmd.arg(self.key(key)).arg(field);
        self.query(cmd).await
    }

    async fn zadd_multiple(&self, key: &str, members: Vec<(i64, String)>) -> RemoteResult<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(self.key(key));
        for (score, member) in members {
            cmd.arg(score).arg(member);
        }
        self.query(cmd).await
    }

    async fn zrangebyscore_limit(
        &self,
        key: &str,
        min: i64,
        max: i64,
        count: usize,
    ) -> RemoteResult<Vec<String>> {
        let mut cmd = redis::cmd("ZRANGEBYSCORE");
        cmd.arg(self.key(key))
            .arg(min)
            .arg(max)
            .arg("LIMIT")
            .arg(0)
            .arg(count);
        self.query(cmd).await
    }

    async fn zrem(&self, key: &str, members: &[String]) -> RemoteResult<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("ZREM");
        cmd.arg(self.key(key)).arg(members);
        self.query(cmd).await
    }

    async fn del(&self, key: &str) -> RemoteResult<usize> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.key(key));
        self.query(cmd).await
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> RemoteResult<bool> {
        // PX 0 is rejected by the server
        let millis = ttl.as_millis().max(1) as u64;
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis);
        let reply: Option<String> = self.query(cmd).await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> RemoteResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.key(key));
        self.query(cmd).await
    }

    async fn ping(&self) -> RemoteResult<()> {
        let _: String = self.query(redis::cmd("PING")).await?;
        Ok(())
    }

    async fn used_memory(&self) -> RemoteResult<Option<u64>> {
        let mut cmd = redis::cmd("INFO");
        cmd.arg("memory");
        let report: String = self.query(cmd).await?;
        Ok(parse_used_memory(&report))
    }

    async fn memory_usage(&self, key: &str) -> RemoteResult<Option<u64>> {
        let mut cmd = redis::cmd("MEMORY");
        cmd.arg("USAGE").arg(self.key(key));
        self.query(cmd).await
    }
}

/// Extracts `used_memory` from an `INFO memory` report.
fn parse_used_memory(report: &str) -> Option<u64> {
    report
        .lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}
