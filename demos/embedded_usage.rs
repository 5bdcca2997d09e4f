//! Minimal embedding example for portfwd-core
//!
//! The host application owns the forwarder and decides when it starts and
//! stops. A simulated engine stands in for a real PCP implementation: it
//! grants the mapping after a few pulses and backs off once it has.

use chrono::{Duration as ChronoDuration, Utc};
use portfwd_core::error::{Error, Result as PortFwdResult};
use portfwd_core::traits::{
    DiscoveryMode, EngineLogLevel, EngineLogSink, FlowHandle, FlowRequest, MappingInfo,
    MappingState, ProtocolEngine, ProtocolEngineFactory, SessionHandle,
};
use portfwd_core::{EngineRegistry, PortForwardConfig, PortForwarder};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Pretends to negotiate with a gateway at 192.0.2.1
struct SimulatedEngine {
    sink: Option<EngineLogSink>,
    session: Option<SessionHandle>,
    request: Option<FlowRequest>,
    pulses: u32,
}

impl SimulatedEngine {
    /// Pulses needed before the gateway answers
    const ROUNDS_TO_GRANT: u32 = 3;

    fn new() -> Self {
        Self {
            sink: None,
            session: None,
            request: None,
            pulses: 0,
        }
    }

    fn log(&self, level: EngineLogLevel, message: &str) {
        if let Some(sink) = &self.sink {
            sink(level, message);
        }
    }
}

#[async_trait::async_trait]
impl ProtocolEngine for SimulatedEngine {
    fn configure_logging(&mut self, _level: EngineLogLevel, sink: Option<EngineLogSink>) {
        self.sink = sink;
    }

    async fn create_session(&mut self, discovery: DiscoveryMode) -> PortFwdResult<SessionHandle> {
        let session = SessionHandle::new(1);
        self.session = Some(session);
        self.log(EngineLogLevel::Info, &format!("Session opened ({})", discovery));
        Ok(session)
    }

    async fn register_gateway(
        &mut self,
        _session: SessionHandle,
        gateway: SocketAddr,
        max_version: u8,
    ) -> PortFwdResult<()> {
        self.log(
            EngineLogLevel::Info,
            &format!("Gateway {} registered (version <= {})", gateway, max_version),
        );
        Ok(())
    }

    async fn create_flow(
        &mut self,
        session: SessionHandle,
        request: &FlowRequest,
    ) -> PortFwdResult<FlowHandle> {
        if self.session != Some(session) {
            return Err(Error::engine("simulated", "unknown session"));
        }
        self.log(
            EngineLogLevel::Debug,
            &format!(
                "MAP request for {} (protocol {}, {}s)",
                request.local,
                request.protocol.number(),
                request.lease_secs
            ),
        );
        self.request = Some(request.clone());
        Ok(FlowHandle::new(1))
    }

    async fn pulse(&mut self, _session: SessionHandle) -> Duration {
        self.pulses += 1;
        if self.pulses < Self::ROUNDS_TO_GRANT {
            Duration::from_millis(250)
        } else {
            Duration::from_secs(1)
        }
    }

    fn evaluate_flow(&mut self, _flow: FlowHandle) -> Option<MappingState> {
        let request = self.request.as_ref()?;
        if self.pulses < Self::ROUNDS_TO_GRANT {
            return Some(MappingState::Pending);
        }

        Some(MappingState::Succeeded(vec![MappingInfo {
            internal_ip: IpAddr::from([192, 168, 1, 20]),
            internal_port: request.local.port(),
            external_ip: IpAddr::from([203, 0, 113, 7]),
            external_port: request.local.port(),
            lease_end: Utc::now() + ChronoDuration::seconds(i64::from(request.lease_secs)),
        }]))
    }

    async fn terminate_session(&mut self, _session: SessionHandle, revoke: bool) {
        if revoke && self.request.is_some() {
            self.log(EngineLogLevel::Info, "Lease revoked");
        }
        self.session = None;
        self.request = None;
        self.sink = None;
    }

    fn engine_name(&self) -> &'static str {
        "simulated"
    }
}

struct SimulatedEngineFactory;

impl ProtocolEngineFactory for SimulatedEngineFactory {
    fn create(&self, _config: &PortForwardConfig) -> PortFwdResult<Box<dyn ProtocolEngine>> {
        Ok(Box::new(SimulatedEngine::new()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("=== Embedded portfwd-core Example ===");

    let registry = EngineRegistry::new();
    registry.register_engine("simulated", Box::new(SimulatedEngineFactory));

    let config = PortForwardConfig::new()
        .with_engine("simulated")
        .with_engine_log_level(EngineLogLevel::Info);
    let engine = registry.create_engine(&config)?;

    let (mut forwarder, mut event_rx) = PortForwarder::with_system_collaborators(engine, config)?;
    info!(
        "Forwarding UDP port {} ({}s lease)",
        forwarder.config().local_port,
        forwarder.config().lease_secs
    );

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!("[Event] {:?}", event);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let forwarder_handle =
        tokio::spawn(async move { forwarder.run_with_shutdown(shutdown_rx).await });

    // The application does its own work while the mapping is negotiated
    tokio::time::sleep(Duration::from_secs(3)).await;

    info!("Stopping forwarder");
    // A send error only means the loop already ended
    let _ = shutdown_tx.send(());
    forwarder_handle.await??;

    // Forwarder dropped, so the event channel closes
    event_listener.await?;

    info!("Forwarder stopped, mapping revoked");
    Ok(())
}
