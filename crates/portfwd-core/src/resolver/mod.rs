// # Address Resolver Implementations
//
// The system resolver is the only built-in implementation; tests and
// embedders with their own name service plug in through the
// `AddressResolver` trait.

use crate::error::{Error, Result};
use crate::traits::AddressResolver;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::debug;

/// Resolver backed by the operating system (`getaddrinfo` via tokio)
///
/// The wildcard binding is the IPv4 unspecified address, which is what a
/// passive lookup yields first on the common dual-stack configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    /// Create a new system resolver
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AddressResolver for SystemResolver {
    async fn resolve(&self, host: Option<&str>, port: u16) -> Result<SocketAddr> {
        let Some(host) = host else {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
        };

        let target = format!("{}:{}", host, port);
        let mut candidates = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| Error::resolution(&target, e.to_string()))?;

        // Every std SocketAddr is v4 or v6, so the first candidate wins
        let addr = candidates
            .next()
            .ok_or_else(|| Error::resolution(&target, "not found"))?;

        debug!("Resolved {} to {}", target, addr);
        Ok(addr)
    }
}
