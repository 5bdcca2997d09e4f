//! Port mapping lifecycle manager
//!
//! The PortForwarder is responsible for:
//! - Choosing between a pinned gateway and auto-discovery
//! - Opening the engine session and requesting the single UDP mapping
//! - Pulsing the engine no more often than it asks to be pulsed
//! - Reporting negotiated mappings and failures
//! - Revoking the mapping on shutdown
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────┐
//!   host loop ────────▶│  PortForwarder   │──── status lines ───▶ StatusReporter
//!   initialize()       └──────────────────┘
//!   maintain()                  │        └──── PortForwardEvent ─▶ mpsc channel
//!   shutdown()                  │
//!             ┌─────────────────┴─────────────────┐
//!             ▼                                   ▼
//!     ┌─────────────────┐                ┌─────────────────┐
//!     │ AddressResolver │                │ ProtocolEngine  │
//!     │ (gateway, bind) │                │ (session, flow) │
//!     └─────────────────┘                └─────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. `initialize()`: resolve, open session, create flow, first pulse
//! 2. `maintain()`: on every host tick; pulses only once the deadline set by
//!    the previous pulse has passed
//! 3. `shutdown()`: terminate with revocation and forget every handle
//!
//! All three are idempotent and never fail: every problem degrades to "port
//! forwarding unavailable" and is reported, never returned.

pub mod report;

use crate::config::PortForwardConfig;
use crate::error::{Error, Result};
use crate::reporter::TracingReporter;
use crate::resolver::SystemResolver;
use crate::traits::{
    AddressResolver, DiscoveryMode, EngineLogLevel, EngineLogSink, FlowHandle, FlowRequest,
    MappingInfo, MappingState, ProtocolEngine, SessionHandle, StatusReporter,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

/// Events emitted by the PortForwarder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortForwardEvent {
    /// Session and mapping request are in place
    Initialized {
        discovery: DiscoveryMode,
        local: SocketAddr,
    },

    /// The engine refused to open a session
    InitializationFailed {
        reason: String,
    },

    /// The gateway override did not resolve; auto-discovery is used instead
    GatewayUnresolved {
        reason: String,
    },

    /// The mapping request could not be created; the session was closed
    MappingCreationFailed {
        reason: String,
    },

    /// A gateway granted the mapping (one event per granted mapping)
    MappingEstablished {
        info: MappingInfo,
    },

    /// Negotiation failed
    MappingFailed,

    /// The session was terminated
    Removed {
        had_mapping: bool,
    },
}

/// Coarse negotiation outcome, remembered between pulses to report a
/// failure once per transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Succeeded,
    Failed,
}

/// Lifecycle manager for one port mapping
///
/// The host application owns the instance and calls
/// [`initialize`](Self::initialize), [`maintain`](Self::maintain) and
/// [`shutdown`](Self::shutdown) from a single task. Nothing here is global:
/// keeping exactly one instance per process is the host's decision.
///
/// ## Scheduling
///
/// `maintain` may be called as often as the host likes. It only pulses the
/// engine once the deadline computed from the previous pulse (with
/// `tokio::time::Instant`, so a monotonic clock) has been reached.
pub struct PortForwarder {
    /// Wire protocol engine
    engine: Box<dyn ProtocolEngine>,

    /// Gateway and bind address resolution
    resolver: Box<dyn AddressResolver>,

    /// Sink for operator status lines
    reporter: Arc<dyn StatusReporter>,

    config: PortForwardConfig,

    /// Open engine session
    session: Option<SessionHandle>,

    /// The mapping request, present only once creation succeeded
    flow: Option<FlowHandle>,

    /// Earliest instant the next pulse may happen
    deadline: Option<Instant>,

    /// Set as soon as a session exists, cleared last on teardown
    initialized: bool,

    /// Outcome seen on the previous evaluation
    last_outcome: Option<Outcome>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<PortForwardEvent>,
}

impl PortForwarder {
    /// Create a new port forwarder
    ///
    /// # Parameters
    ///
    /// - `engine`: Protocol engine implementation
    /// - `resolver`: Address resolver implementation
    /// - `reporter`: Status line sink
    /// - `config`: Port forwarding configuration
    ///
    /// # Returns
    ///
    /// A tuple of (forwarder, event_receiver) where event_receiver yields
    /// lifecycle events
    pub fn new(
        engine: Box<dyn ProtocolEngine>,
        resolver: Box<dyn AddressResolver>,
        reporter: Arc<dyn StatusReporter>,
        config: PortForwardConfig,
    ) -> Result<(Self, mpsc::Receiver<PortForwardEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let forwarder = Self {
            engine,
            resolver,
            reporter,
            config,
            session: None,
            flow: None,
            deadline: None,
            initialized: false,
            last_outcome: None,
            event_tx: tx,
        };

        Ok((forwarder, rx))
    }

    /// Create a port forwarder using the system resolver and reporting
    /// status lines through `tracing`
    pub fn with_system_collaborators(
        engine: Box<dyn ProtocolEngine>,
        config: PortForwardConfig,
    ) -> Result<(Self, mpsc::Receiver<PortForwardEvent>)> {
        Self::new(
            engine,
            Box::new(SystemResolver::new()),
            Arc::new(TracingReporter::new()),
            config,
        )
    }

    /// Whether a session is currently open
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the mapping request exists
    pub fn has_mapping(&self) -> bool {
        self.flow.is_some()
    }

    /// When the engine next wants to be pulsed, if initialized
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The configuration this forwarder was built with
    pub fn config(&self) -> &PortForwardConfig {
        &self.config
    }

    /// Open the session and request the mapping
    ///
    /// Does nothing when already initialized. On failure the forwarder is
    /// left uninitialized and calling this again is the way to retry.
    pub async fn initialize(&mut self) {
        if self.initialized {
            debug!("Port forwarding already initialized");
            return;
        }

        let gateway = self.resolve_gateway().await;
        let discovery = match gateway {
            Some(_) => DiscoveryMode::Pinned,
            None => DiscoveryMode::Auto,
        };

        // Engines may log while the session is created
        self.install_log_bridge();

        let session = match self.engine.create_session(discovery).await {
            Ok(session) => session,
            Err(e) => {
                error!("{} engine failed to open a session: {}", self.engine.engine_name(), e);
                self.status(report::INITIALIZATION_FAILED);
                self.emit_event(PortForwardEvent::InitializationFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        // From here on every failure goes through shutdown(), which keys off
        // this flag
        self.session = Some(session);
        self.initialized = true;
        debug!("Opened session {} ({})", session.id(), discovery);

        if let Some(gateway) = gateway {
            let version = self.config.max_protocol_version;
            // A pinned session has no other gateway to talk to
            if let Err(e) = self.engine.register_gateway(session, gateway, version).await {
                error!("Failed to register gateway {}: {}", gateway, e);
                self.status(&report::failure(&e));
                self.abort_mapping(e).await;
                return;
            }
        }

        let local = match self.resolver.resolve(None, self.config.local_port).await {
            Ok(local) => local,
            Err(e) => {
                if e.is_configuration() {
                    error!("Local bind address unusable, check configuration: {}", e);
                } else {
                    warn!("Failed to resolve local bind address: {}", e);
                }
                self.status(&report::failure(&e));
                self.abort_mapping(e).await;
                return;
            }
        };

        let request = FlowRequest::udp(local, self.config.lease_secs);
        match self.engine.create_flow(session, &request).await {
            Ok(flow) => self.flow = Some(flow),
            Err(e) => {
                error!("Failed to create mapping for {}: {}", local, e);
                self.abort_mapping(e).await;
                return;
            }
        }

        info!(
            "Requested UDP mapping for {} ({}s lease, {})",
            local, self.config.lease_secs, discovery
        );
        self.status(report::INITIALIZED);
        self.emit_event(PortForwardEvent::Initialized { discovery, local });

        // Start negotiating right away
        let wait = self.engine.pulse(session).await;
        self.schedule(wait);
    }

    /// Periodic maintenance, called from the host's loop
    ///
    /// Returns immediately unless initialized and past the deadline.
    /// Otherwise pulses the engine once, reschedules, and reports on the
    /// flow's state.
    pub async fn maintain(&mut self) {
        if !self.initialized {
            return;
        }

        if let Some(deadline) = self.deadline {
            if Instant::now() < deadline {
                return;
            }
        }

        let (Some(session), Some(flow)) = (self.session, self.flow) else {
            return;
        };

        // Drives retransmission, renewal and response processing
        let wait = self.engine.pulse(session).await;
        self.schedule(wait);

        match self.engine.evaluate_flow(flow) {
            None => {}
            Some(MappingState::Pending) => self.last_outcome = Some(Outcome::Pending),
            Some(MappingState::Failed) => {
                // Not terminal: keep pulsing in case the engine recovers
                if self.last_outcome != Some(Outcome::Failed) {
                    warn!("Port mapping negotiation failed");
                    self.status(report::MAPPING_FAILED);
                    self.emit_event(PortForwardEvent::MappingFailed);
                }
                self.last_outcome = Some(Outcome::Failed);
            }
            Some(MappingState::Succeeded(mappings)) => {
                for info in mappings {
                    self.status(&report::mapping_successful(&info));
                    self.status(&report::mapping_valid_until(&info));
                    self.emit_event(PortForwardEvent::MappingEstablished { info });
                }
                self.last_outcome = Some(Outcome::Succeeded);
            }
        }
    }

    /// Terminate the session, revoking the mapping
    ///
    /// Safe to call in any state; does nothing unless initialized.
    pub async fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }

        if let Some(session) = self.session {
            self.engine.terminate_session(session, true).await;
        }

        let had_mapping = self.flow.is_some();
        if had_mapping {
            self.status(report::MAPPING_REMOVED);
        } else {
            self.status(report::SHUTDOWN);
        }
        self.emit_event(PortForwardEvent::Removed { had_mapping });

        self.session = None;
        self.flow = None;
        self.deadline = None;
        self.last_outcome = None;
        self.initialized = false;
        info!("Port forwarding stopped");
    }

    /// Run the forwarder until Ctrl-C
    ///
    /// Initializes, calls `maintain` every `tick_interval_ms`, and shuts
    /// down (revoking the mapping) when the signal arrives.
    pub async fn run(&mut self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the forwarder until `shutdown_rx` fires (or its sender is dropped)
    pub async fn run_with_shutdown(&mut self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_internal(Some(shutdown_rx)).await
    }

    async fn run_internal(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.initialize().await;

        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        let outcome = if let Some(mut rx) = shutdown_rx {
            loop {
                tokio::select! {
                    Some(_) = ticks.next() => self.maintain().await,

                    _ = &mut rx => {
                        info!("Shutdown signal received");
                        break Ok(());
                    }
                }
            }
        } else {
            loop {
                tokio::select! {
                    Some(_) = ticks.next() => self.maintain().await,

                    signal = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        break signal.map_err(Error::from);
                    }
                }
            }
        };

        self.shutdown().await;
        outcome
    }

    /// Resolve the gateway override, if any
    ///
    /// An override that does not resolve is reported and ignored, falling
    /// back to auto-discovery.
    async fn resolve_gateway(&self) -> Option<SocketAddr> {
        let host = self.config.gateway.as_deref()?;

        match self.resolver.resolve(Some(host), self.config.gateway_port).await {
            Ok(addr) => {
                info!("Using gateway {} ({})", host, addr);
                Some(addr)
            }
            Err(e) => {
                if e.is_configuration() {
                    warn!(
                        "Gateway override '{}' unusable, falling back to auto-discovery: {}",
                        host, e
                    );
                } else {
                    info!(
                        "Gateway override '{}' unreachable for now, using auto-discovery: {}",
                        host, e
                    );
                }
                self.status(&report::failure(&e));
                self.emit_event(PortForwardEvent::GatewayUnresolved {
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Give up on the mapping after the session was opened
    async fn abort_mapping(&mut self, err: Error) {
        self.status(report::MAPPING_INIT_FAILED);
        self.emit_event(PortForwardEvent::MappingCreationFailed {
            reason: err.to_string(),
        });
        self.shutdown().await;
    }

    /// Route engine diagnostics to the status reporter
    fn install_log_bridge(&mut self) {
        let level = self.config.engine_log_level;
        let sink = match level {
            EngineLogLevel::None => None,
            _ => {
                let reporter = Arc::clone(&self.reporter);
                let sink: EngineLogSink = Arc::new(move |_level, message: &str| {
                    reporter.report(&report::engine_message(message));
                });
                Some(sink)
            }
        };
        self.engine.configure_logging(level, sink);
    }

    /// Set the next deadline, never further out than one lease
    fn schedule(&mut self, wait: Duration) {
        let cap = Duration::from_secs(u64::from(self.config.lease_secs));
        let wait = if wait > cap {
            warn!(
                "{} engine asked to wait {:?}, capping at the {}s lease",
                self.engine.engine_name(),
                wait,
                self.config.lease_secs
            );
            cap
        } else {
            wait
        };

        debug!("Next engine pulse in {:?}", wait);
        let now = Instant::now();
        self.deadline = Some(now.checked_add(wait).unwrap_or(now));
    }

    fn status(&self, line: &str) {
        self.reporter.report(line);
    }

    /// Emit a lifecycle event
    fn emit_event(&self, event: PortForwardEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody listening; the status lines still went out
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
