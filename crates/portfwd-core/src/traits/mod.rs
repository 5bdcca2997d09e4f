//! Core traits for the port forwarding system
//!
//! This module defines the abstract interfaces to the lifecycle manager's
//! collaborators.
//!
//! - [`ProtocolEngine`]: PCP / NAT-PMP wire engine
//! - [`AddressResolver`]: Hostname and wildcard address resolution
//! - [`StatusReporter`]: Sink for operator status lines

pub mod protocol_engine;
pub mod address_resolver;
pub mod status_reporter;

pub use protocol_engine::{
    DiscoveryMode, EngineLogLevel, EngineLogSink, FlowHandle, FlowRequest, MappingInfo,
    MappingState, ProtocolEngine, ProtocolEngineFactory, SessionHandle, TransportProtocol,
};
pub use address_resolver::AddressResolver;
pub use status_reporter::StatusReporter;
