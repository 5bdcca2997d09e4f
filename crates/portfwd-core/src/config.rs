//! Configuration types for the port forwarding system
//!
//! A [`PortForwardConfig`] can be built in code, deserialized from JSON, or
//! read from `PORTFWD_*` environment variables.

use crate::error::{Error, Result};
use crate::traits::EngineLogLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// IANA assigned UDP port PCP and NAT-PMP servers listen on
pub const PCP_SERVER_PORT: u16 = 5351;

/// Highest protocol version the client negotiates (PCP is version 2,
/// NAT-PMP is version 0)
pub const PCP_MAX_SUPPORTED_VERSION: u8 = 2;

/// Lease requested for the mapping: two hours
pub const DEFAULT_LEASE_SECS: u32 = 7200;

/// UDP port of the service being exposed when none is configured
pub const DEFAULT_LOCAL_PORT: u16 = 7808;

/// Main port forwarding configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForwardConfig {
    /// Explicit gateway (hostname or literal address). Disables
    /// auto-discovery when it resolves
    #[serde(default)]
    pub gateway: Option<String>,

    /// Port the gateway's PCP server listens on
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,

    /// Local UDP port to forward
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Requested lease in seconds
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u32,

    /// Highest protocol version spoken to a pinned gateway. 0 restricts
    /// the engine to NAT-PMP
    #[serde(default = "default_max_protocol_version")]
    pub max_protocol_version: u8,

    /// Engine type name, looked up in the [`EngineRegistry`](crate::EngineRegistry)
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Verbosity of the engine's own diagnostics
    #[serde(default = "default_engine_log_level")]
    pub engine_log_level: EngineLogLevel,

    /// Capacity of the structured event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Cadence of the built-in host loop, in milliseconds
    ///
    /// This is only how often `maintain` gets a chance to run; the engine's
    /// recommended interval still decides when it actually pulses.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl PortForwardConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            gateway: None,
            gateway_port: default_gateway_port(),
            local_port: default_local_port(),
            lease_secs: default_lease_secs(),
            max_protocol_version: default_max_protocol_version(),
            engine: default_engine(),
            engine_log_level: default_engine_log_level(),
            event_channel_capacity: default_event_channel_capacity(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }

    /// Pin the gateway instead of auto-discovering it
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    /// Set the local UDP port to forward
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Set the engine type name
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    /// Set the engine diagnostics level
    pub fn with_engine_log_level(mut self, level: EngineLogLevel) -> Self {
        self.engine_log_level = level;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(gateway) = &self.gateway {
            if gateway.trim().is_empty() {
                return Err(Error::config("Gateway override cannot be empty"));
            }
        }

        if self.gateway_port == 0 {
            return Err(Error::config("Gateway port must be > 0"));
        }

        if self.local_port == 0 {
            return Err(Error::config("Local port must be > 0"));
        }

        if self.lease_secs == 0 {
            return Err(Error::config("Lease must be > 0 seconds"));
        }

        if self.max_protocol_version > PCP_MAX_SUPPORTED_VERSION {
            return Err(Error::config(format!(
                "Protocol version must be between 0 and {}. Got: {}",
                PCP_MAX_SUPPORTED_VERSION, self.max_protocol_version
            )));
        }

        if self.engine.is_empty() {
            return Err(Error::config("Engine type cannot be empty"));
        }

        if self.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }

        if self.tick_interval_ms == 0 {
            return Err(Error::config("Tick interval must be > 0"));
        }

        Ok(())
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Load configuration from `PORTFWD_*` environment variables
    ///
    /// - `PORTFWD_GATEWAY`: gateway override
    /// - `PORTFWD_GATEWAY_PORT`: gateway PCP port
    /// - `PORTFWD_LOCAL_PORT`: local UDP port to forward
    /// - `PORTFWD_LEASE_SECS`: requested lease
    /// - `PORTFWD_ENGINE`: engine type name
    /// - `PORTFWD_ENGINE_LOG_LEVEL`: none, error, warn, info or debug
    /// - `PORTFWD_TICK_MS`: host loop cadence
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key/value source, using the same
    /// variable names as [`from_env`](Self::from_env)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        config.gateway = lookup("PORTFWD_GATEWAY").filter(|g| !g.trim().is_empty());

        if let Some(port) = parse_var(&lookup, "PORTFWD_GATEWAY_PORT")? {
            config.gateway_port = port;
        }
        if let Some(port) = parse_var(&lookup, "PORTFWD_LOCAL_PORT")? {
            config.local_port = port;
        }
        if let Some(lease) = parse_var(&lookup, "PORTFWD_LEASE_SECS")? {
            config.lease_secs = lease;
        }
        if let Some(engine) = lookup("PORTFWD_ENGINE") {
            config.engine = engine;
        }
        if let Some(level) = parse_var(&lookup, "PORTFWD_ENGINE_LOG_LEVEL")? {
            config.engine_log_level = level;
        }
        if let Some(tick) = parse_var(&lookup, "PORTFWD_TICK_MS")? {
            config.tick_interval_ms = tick;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for PortForwardConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::config(format!("{} '{}' is not valid: {}", key, raw, e))),
    }
}

fn default_gateway_port() -> u16 {
    PCP_SERVER_PORT
}

fn default_local_port() -> u16 {
    DEFAULT_LOCAL_PORT
}

fn default_lease_secs() -> u32 {
    DEFAULT_LEASE_SECS
}

fn default_max_protocol_version() -> u8 {
    PCP_MAX_SUPPORTED_VERSION
}

fn default_engine() -> String {
    "pcp".to_string()
}

fn default_engine_log_level() -> EngineLogLevel {
    if cfg!(debug_assertions) {
        EngineLogLevel::Info
    } else {
        EngineLogLevel::None
    }
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_tick_interval_ms() -> u64 {
    100
}
