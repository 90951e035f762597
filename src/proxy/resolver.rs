use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::lookup_host;

use crate::error::{ProxyError, ProxyResult};

/// Resolves an origin host name to a socket address.
///
/// The production implementation goes through the system resolver; tests
/// swap in [`StaticResolver`] to map made-up hosts onto loopback
/// listeners. Host names are passed through byte-for-byte, with no case
/// normalization.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> ProxyResult<SocketAddr>;
}

/// System DNS resolution via `tokio::net::lookup_host`.
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> ProxyResult<SocketAddr> {
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|e| ProxyError::resolve(host, e.to_string()))?;
        addrs
            .next()
            .ok_or_else(|| ProxyError::resolve(host, "no addresses returned"))
    }
}

/// Fixed host-to-address mapping for tests.
///
/// A mapped port of 0 means "keep the requested port"; any other value
/// overrides it, which lets tests redirect a well-known origin port to
/// an ephemeral stub listener.
pub struct StaticResolver {
    hosts: HashMap<String, SocketAddr>,
}

impl StaticResolver {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = (S, SocketAddr)>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|(host, addr)| (host.into(), addr))
                .collect(),
        }
    }

    /// Map every listed host to the loopback address on the requested port.
    pub fn loopback<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            hosts
                .into_iter()
                .map(|host| (host, SocketAddr::from(([127, 0, 0, 1], 0)))),
        )
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, port: u16) -> ProxyResult<SocketAddr> {
        let mapped = self
            .hosts
            .get(host)
            .ok_or_else(|| ProxyError::resolve(host, "host not in static map"))?;
        let port = if mapped.port() == 0 {
            port
        } else {
            mapped.port()
        };
        Ok(SocketAddr::new(mapped.ip(), port))
    }
}
