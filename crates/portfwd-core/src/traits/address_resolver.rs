// # Address Resolver Trait
//
// Turns a gateway override or a local bind request into a socket address.
//
// ## Implementations
//
// - System resolver (tokio `lookup_host`): `crate::resolver::SystemResolver`

use async_trait::async_trait;
use std::net::SocketAddr;

/// Trait for address resolution
///
/// # Contract
///
/// - `host = Some(name)`: resolve `name` (hostname or literal address) at
///   `port` and return the first IPv4 or IPv6 candidate, in the order the
///   resolver produced them. No family is preferred.
/// - `host = None`: return a wildcard (passive) binding on `port`.
///
/// A failure is reported as [`crate::Error::Resolution`]; callers treat it
/// as a configuration problem, not a transient fault.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve `host` (or the wildcard address) at `port`
    async fn resolve(&self, host: Option<&str>, port: u16) -> crate::Result<SocketAddr>;
}
