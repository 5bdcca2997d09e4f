// # Protocol Engine Trait
//
// Defines the interface to the PCP / NAT-PMP wire engine.
//
// The engine owns the UDP transport, gateway discovery, message framing,
// retransmission and lease renewal. The lifecycle manager only opens a
// session, asks for one mapping, pulses the engine on the schedule it
// recommends and looks at the outcome.
//
// ## Usage
//
// ```rust,ignore
// use portfwd_core::traits::{DiscoveryMode, FlowRequest, ProtocolEngine};
//
// let session = engine.create_session(DiscoveryMode::Auto).await?;
// let flow = engine.create_flow(session, &FlowRequest::udp(local, 7200)).await?;
// let wait = engine.pulse(session).await;
// if let Some(state) = engine.evaluate_flow(flow) {
//     println!("{:?}", state);
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How the engine finds the gateway it talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Probe the local network for the gateway
    Auto,
    /// Only talk to gateways registered with
    /// [`ProtocolEngine::register_gateway`]
    Pinned,
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryMode::Auto => f.write_str("auto-discovery"),
            DiscoveryMode::Pinned => f.write_str("pinned gateway"),
        }
    }
}

/// Verbosity of the engine's own diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineLogLevel {
    /// Engine output is suppressed entirely
    None,
    Error,
    Warn,
    Info,
    Debug,
}

impl FromStr for EngineLogLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(crate::Error::config(format!(
                "Unknown engine log level '{}'. Valid levels: none, error, warn, info, debug",
                other
            ))),
        }
    }
}

/// Callback receiving the engine's diagnostic messages
pub type EngineLogSink = Arc<dyn Fn(EngineLogLevel, &str) + Send + Sync>;

/// Opaque handle to an engine session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Wrap an engine-assigned session id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The engine-assigned session id
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Opaque handle to a mapping request owned by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowHandle(u64);

impl FlowHandle {
    /// Wrap an engine-assigned flow id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The engine-assigned flow id
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Transport protocol of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Udp,
}

impl TransportProtocol {
    /// IANA protocol number, as carried in PCP MAP requests
    pub fn number(&self) -> u8 {
        match self {
            TransportProtocol::Udp => 17,
        }
    }
}

/// The mapping the client wants the gateway to hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    /// Internal address and port traffic should be forwarded to
    pub local: SocketAddr,
    /// Remote peer, for PEER-style requests. `None` maps for any peer
    pub remote_peer: Option<SocketAddr>,
    /// Suggested external address and port. `None` accepts anything
    pub external_hint: Option<SocketAddr>,
    /// Transport protocol to map
    pub protocol: TransportProtocol,
    /// Requested lease length in seconds
    pub lease_secs: u32,
    /// Mapping nonce to reuse. `None` lets the engine pick a fresh one
    pub nonce: Option<[u8; 12]>,
}

impl FlowRequest {
    /// Request a UDP mapping of `local` for `lease_secs`, with no external hint
    pub fn udp(local: SocketAddr, lease_secs: u32) -> Self {
        Self {
            local,
            remote_peer: None,
            external_hint: None,
            protocol: TransportProtocol::Udp,
            lease_secs,
            nonce: None,
        }
    }
}

/// One negotiated mapping, as granted by a gateway
///
/// Ports are in host byte order; engines convert from the wire before
/// handing the record out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingInfo {
    /// Internal (client side) address
    pub internal_ip: IpAddr,
    /// Internal (client side) port
    pub internal_port: u16,
    /// External address assigned by the gateway
    pub external_ip: IpAddr,
    /// External port assigned by the gateway
    pub external_port: u16,
    /// When the lease received from the gateway runs out
    pub lease_end: DateTime<Utc>,
}

/// Outcome of a flow evaluation
///
/// A flow spanning several gateways or address families reports one
/// [`MappingInfo`] per granted mapping. The list is produced fresh for each
/// evaluation and belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingState {
    /// Negotiation or renewal is in progress
    Pending,
    /// The gateway granted the mapping
    Succeeded(Vec<MappingInfo>),
    /// The gateway refused, or never answered
    Failed,
}

/// Trait for protocol engine implementations
///
/// All calls come from a single control task; implementations need no
/// internal locking against the lifecycle manager, but must be `Send` so
/// the manager can live inside a spawned task.
///
/// # Responsibilities
///
/// - ✅ UDP transport, gateway discovery and message exchange
/// - ✅ Retransmission, back-off and lease renewal inside `pulse`
/// - ❌ Deciding when to pulse (owned by `PortForwarder`)
/// - ❌ Reporting status to the operator (owned by `PortForwarder`)
///
/// `pulse` must not block beyond a loop tick: anything it waits on is
/// expressed through the returned delay instead.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Install the diagnostic bridge
    ///
    /// Called before [`create_session`](Self::create_session) so output
    /// produced while the session is being set up is not lost. `sink` is
    /// `None` when `level` is [`EngineLogLevel::None`].
    fn configure_logging(&mut self, level: EngineLogLevel, sink: Option<EngineLogSink>);

    /// Open a session
    async fn create_session(&mut self, discovery: DiscoveryMode) -> crate::Result<SessionHandle>;

    /// Pin a gateway to the session, speaking at most `max_version`
    async fn register_gateway(
        &mut self,
        session: SessionHandle,
        gateway: SocketAddr,
        max_version: u8,
    ) -> crate::Result<()>;

    /// Create the mapping request for the session
    async fn create_flow(
        &mut self,
        session: SessionHandle,
        request: &FlowRequest,
    ) -> crate::Result<FlowHandle>;

    /// Advance timers, send due requests and process received responses
    ///
    /// # Returns
    ///
    /// How long the caller should wait before pulsing again
    async fn pulse(&mut self, session: SessionHandle) -> Duration;

    /// Look at where the flow's negotiation stands
    ///
    /// # Returns
    ///
    /// - `Some(state)`: the current state of the flow
    /// - `None`: the engine has nothing to report for this flow right now
    fn evaluate_flow(&mut self, flow: FlowHandle) -> Option<MappingState>;

    /// Close the session, deleting its mappings from the gateway first
    /// when `revoke` is set
    async fn terminate_session(&mut self, session: SessionHandle, revoke: bool);

    /// Name of the engine, used in diagnostics
    fn engine_name(&self) -> &'static str;
}

/// Helper trait for constructing protocol engines from configuration
pub trait ProtocolEngineFactory: Send + Sync {
    /// Create a ProtocolEngine instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Port forwarding configuration
    ///
    /// # Returns
    ///
    /// A boxed ProtocolEngine trait object
    fn create(
        &self,
        config: &crate::config::PortForwardConfig,
    ) -> crate::Result<Box<dyn ProtocolEngine>>;
}
