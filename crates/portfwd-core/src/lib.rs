// # portfwd-core
//
// Core library for keeping a NAT port mapping alive.
//
// ## Architecture Overview
//
// This library maintains one PCP / NAT-PMP lease for a local UDP service
// port so peers outside the NAT can reach it:
// - **ProtocolEngine**: Trait for the wire engine (sessions, flows, pulses)
// - **AddressResolver**: Trait for gateway and bind address resolution
// - **StatusReporter**: Trait for operator status lines
// - **PortForwarder**: Lifecycle manager driving the above from the host loop
// - **EngineRegistry**: Plugin-based registry for protocol engines
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Lifecycle logic is separate from the wire protocol
// 2. **Engine-Paced**: The engine says when it next needs attention; the core obeys
// 3. **Plugin-Based**: Engines are registered dynamically, no hard-coded if-else
// 4. **Library-First**: The host owns the forwarder; no global state
// 5. **Idempotency**: Start and stop are safe to repeat in any order

pub mod traits;
pub mod forwarder;
pub mod registry;
pub mod config;
pub mod error;
pub mod resolver;
pub mod reporter;

// Re-export core types for convenience
pub use traits::{AddressResolver, ProtocolEngine, StatusReporter};
pub use forwarder::{PortForwardEvent, PortForwarder};
pub use registry::EngineRegistry;
pub use config::PortForwardConfig;
pub use error::{Error, Result};
pub use resolver::SystemResolver;
pub use reporter::TracingReporter;
