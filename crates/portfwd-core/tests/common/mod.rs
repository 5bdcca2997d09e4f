//! Test doubles and common utilities for lifecycle contract tests
//!
//! This module provides minimal test doubles that record how the
//! forwarder drives its collaborators without implementing any protocol.

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use portfwd_core::config::PortForwardConfig;
use portfwd_core::error::{Error, Result};
use portfwd_core::traits::{
    AddressResolver, DiscoveryMode, EngineLogLevel, EngineLogSink, FlowHandle, FlowRequest,
    MappingInfo, MappingState, ProtocolEngine, ProtocolEngineFactory, SessionHandle,
    StatusReporter,
};
use portfwd_core::{PortForwardEvent, PortForwarder};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Every call the forwarder made into the engine, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    ConfigureLogging { level: EngineLogLevel, has_sink: bool },
    CreateSession(DiscoveryMode),
    RegisterGateway { gateway: SocketAddr, max_version: u8 },
    CreateFlow(FlowRequest),
    Pulse,
    Evaluate,
    Terminate { revoke: bool },
}

#[derive(Default)]
struct Script {
    calls: Vec<EngineCall>,
    /// Number of create_session calls that fail before one succeeds
    session_failures: usize,
    fail_flow: bool,
    /// Number of register_gateway calls that fail before one succeeds
    register_failures: usize,
    pulse_waits: VecDeque<Duration>,
    default_wait: Duration,
    states: VecDeque<Option<MappingState>>,
    default_state: Option<MappingState>,
    sink: Option<EngineLogSink>,
    session_message: Option<String>,
    next_id: u64,
}

/// A protocol engine that replays scripted pulse waits and flow states
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

/// Test-side view of a [`ScriptedEngine`] that was moved into a forwarder
#[derive(Clone)]
pub struct EngineProbe {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    /// Create an engine that always succeeds, asks to be pulsed every
    /// second and reports `Pending`
    pub fn new() -> (Self, EngineProbe) {
        let script = Arc::new(Mutex::new(Script {
            default_wait: Duration::from_secs(1),
            default_state: Some(MappingState::Pending),
            ..Script::default()
        }));
        (
            Self {
                script: Arc::clone(&script),
            },
            EngineProbe { script },
        )
    }
}

impl EngineProbe {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.script.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn pulse_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::Pulse))
    }

    pub fn session_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::CreateSession(_)))
    }

    pub fn flow_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::CreateFlow(_)))
    }

    pub fn terminate_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::Terminate { .. }))
    }

    pub fn fail_sessions(&self, times: usize) -> &Self {
        self.script.lock().unwrap().session_failures = times;
        self
    }

    pub fn fail_flow(&self) -> &Self {
        self.script.lock().unwrap().fail_flow = true;
        self
    }

    /// Fail the next gateway registration
    pub fn fail_register(&self) -> &Self {
        self.script.lock().unwrap().register_failures = 1;
        self
    }

    /// Queue the waits returned by the next pulses
    pub fn push_waits(&self, waits: &[u64]) -> &Self {
        let mut script = self.script.lock().unwrap();
        script
            .pulse_waits
            .extend(waits.iter().map(|ms| Duration::from_millis(*ms)));
        self
    }

    pub fn set_default_wait(&self, wait: Duration) -> &Self {
        self.script.lock().unwrap().default_wait = wait;
        self
    }

    /// Queue the results of the next evaluations
    pub fn push_states(&self, states: Vec<Option<MappingState>>) -> &Self {
        self.script.lock().unwrap().states.extend(states);
        self
    }

    pub fn set_default_state(&self, state: Option<MappingState>) -> &Self {
        self.script.lock().unwrap().default_state = state;
        self
    }

    /// Message the engine logs while the session is being created
    pub fn log_during_session(&self, message: &str) -> &Self {
        self.script.lock().unwrap().session_message = Some(message.to_string());
        self
    }
}

#[async_trait::async_trait]
impl ProtocolEngine for ScriptedEngine {
    fn configure_logging(&mut self, level: EngineLogLevel, sink: Option<EngineLogSink>) {
        let mut script = self.script.lock().unwrap();
        script.calls.push(EngineCall::ConfigureLogging {
            level,
            has_sink: sink.is_some(),
        });
        script.sink = sink;
    }

    async fn create_session(&mut self, discovery: DiscoveryMode) -> Result<SessionHandle> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(EngineCall::CreateSession(discovery));

        if let (Some(sink), Some(message)) = (&script.sink, &script.session_message) {
            sink(EngineLogLevel::Info, message);
        }

        if script.session_failures > 0 {
            script.session_failures -= 1;
            return Err(Error::session("no usable network interface"));
        }

        script.next_id += 1;
        Ok(SessionHandle::new(script.next_id))
    }

    async fn register_gateway(
        &mut self,
        _session: SessionHandle,
        gateway: SocketAddr,
        max_version: u8,
    ) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(EngineCall::RegisterGateway {
            gateway,
            max_version,
        });
        if script.register_failures > 0 {
            script.register_failures -= 1;
            return Err(Error::engine("scripted", "gateway table full"));
        }
        Ok(())
    }

    async fn create_flow(
        &mut self,
        _session: SessionHandle,
        request: &FlowRequest,
    ) -> Result<FlowHandle> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(EngineCall::CreateFlow(request.clone()));
        if script.fail_flow {
            return Err(Error::mapping("flow table exhausted"));
        }
        script.next_id += 1;
        Ok(FlowHandle::new(script.next_id))
    }

    async fn pulse(&mut self, _session: SessionHandle) -> Duration {
        let mut script = self.script.lock().unwrap();
        script.calls.push(EngineCall::Pulse);
        let default_wait = script.default_wait;
        script.pulse_waits.pop_front().unwrap_or(default_wait)
    }

    fn evaluate_flow(&mut self, _flow: FlowHandle) -> Option<MappingState> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(EngineCall::Evaluate);
        match script.states.pop_front() {
            Some(state) => state,
            None => script.default_state.clone(),
        }
    }

    async fn terminate_session(&mut self, _session: SessionHandle, revoke: bool) {
        let mut script = self.script.lock().unwrap();
        script.calls.push(EngineCall::Terminate { revoke });
        script.sink = None;
    }

    fn engine_name(&self) -> &'static str {
        "scripted"
    }
}

/// Factory handing out engines that share one probe
pub struct ScriptedEngineFactory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngineFactory {
    pub fn new(probe: &EngineProbe) -> Self {
        Self {
            script: Arc::clone(&probe.script),
        }
    }
}

impl ProtocolEngineFactory for ScriptedEngineFactory {
    fn create(&self, _config: &PortForwardConfig) -> Result<Box<dyn ProtocolEngine>> {
        Ok(Box::new(ScriptedEngine {
            script: Arc::clone(&self.script),
        }))
    }
}

/// A resolver answering from a fixed table
#[derive(Clone)]
pub struct StaticResolver {
    wildcard: IpAddr,
    hosts: HashMap<String, IpAddr>,
    fail_wildcard: bool,
    lookups: Arc<Mutex<Vec<(Option<String>, u16)>>>,
}

impl StaticResolver {
    /// Resolve the wildcard bind to `0.0.0.0` and no hostnames
    pub fn new() -> Self {
        Self {
            wildcard: IpAddr::from([0, 0, 0, 0]),
            hosts: HashMap::new(),
            fail_wildcard: false,
            lookups: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_host(mut self, host: &str, ip: IpAddr) -> Self {
        self.hosts.insert(host.to_string(), ip);
        self
    }

    pub fn with_wildcard(mut self, ip: IpAddr) -> Self {
        self.wildcard = ip;
        self
    }

    pub fn failing_wildcard(mut self) -> Self {
        self.fail_wildcard = true;
        self
    }

    /// Every (host, port) pair looked up so far
    pub fn lookups(&self) -> Vec<(Option<String>, u16)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, host: Option<&str>, port: u16) -> Result<SocketAddr> {
        self.lookups
            .lock()
            .unwrap()
            .push((host.map(str::to_string), port));

        match host {
            None if self.fail_wildcard => Err(Error::resolution(
                format!("*:{}", port),
                "address family not supported",
            )),
            None => Ok(SocketAddr::new(self.wildcard, port)),
            Some(host) => self
                .hosts
                .get(host)
                .map(|ip| SocketAddr::new(*ip, port))
                .ok_or_else(|| Error::resolution(format!("{}:{}", host, port), "not found")),
        }
    }
}

/// A reporter that keeps every status line
#[derive(Clone, Default)]
pub struct RecordingReporter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn count(&self, line: &str) -> usize {
        self.lines.lock().unwrap().iter().filter(|l| *l == line).count()
    }

    pub fn count_prefixed(&self, prefix: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.starts_with(prefix))
            .count()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap().clear();
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Everything a contract test needs to drive and observe one forwarder
pub struct Harness {
    pub forwarder: PortForwarder,
    pub events: mpsc::Receiver<PortForwardEvent>,
    pub engine: EngineProbe,
    pub resolver: StaticResolver,
    pub reporter: RecordingReporter,
}

impl Harness {
    /// Drain every event emitted so far
    pub fn drain_events(&mut self) -> Vec<PortForwardEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Build a forwarder around fresh test doubles
pub fn harness(config: PortForwardConfig) -> Harness {
    harness_with_resolver(config, StaticResolver::new())
}

/// Build a forwarder around fresh test doubles and the given resolver
pub fn harness_with_resolver(config: PortForwardConfig, resolver: StaticResolver) -> Harness {
    let (engine, probe) = ScriptedEngine::new();
    let reporter = RecordingReporter::new();

    let (forwarder, events) = PortForwarder::new(
        Box::new(engine),
        Box::new(resolver.clone()),
        Arc::new(reporter.clone()),
        config,
    )
    .expect("forwarder construction succeeds");

    Harness {
        forwarder,
        events,
        engine: probe,
        resolver,
        reporter,
    }
}

/// Minimal configuration forwarding UDP 7777 through auto-discovery
pub fn minimal_config() -> PortForwardConfig {
    PortForwardConfig::new()
        .with_local_port(7777)
        .with_engine("scripted")
        .with_engine_log_level(EngineLogLevel::Info)
}

/// The mapping from the documented example: 10.0.0.5:7777 <-> 203.0.113.9:51234
pub fn sample_mapping() -> MappingInfo {
    mapping(IpAddr::from([10, 0, 0, 5]), 7777, IpAddr::from([203, 0, 113, 9]), 51234)
}

pub fn mapping(
    internal_ip: IpAddr,
    internal_port: u16,
    external_ip: IpAddr,
    external_port: u16,
) -> MappingInfo {
    MappingInfo {
        internal_ip,
        internal_port,
        external_ip,
        external_port,
        lease_end: Utc::now() + ChronoDuration::seconds(7200),
    }
}
