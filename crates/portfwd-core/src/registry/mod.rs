//! Plugin-based engine registry
//!
//! The registry allows protocol engines to be registered dynamically at
//! runtime and selected by name from configuration, avoiding hardcoded
//! if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use portfwd_core::{EngineRegistry, PortForwardConfig};
//!
//! let registry = EngineRegistry::new();
//! registry.register_engine("pcp", Box::new(PcpEngineFactory));
//!
//! let config = PortForwardConfig::new().with_engine("pcp");
//! let engine = registry.create_engine(&config)?;
//! ```

use crate::config::PortForwardConfig;
use crate::error::{Error, Result};
use crate::traits::{ProtocolEngine, ProtocolEngineFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Registry of protocol engine factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct EngineRegistry {
    /// Registered engine factories, keyed by engine type name
    engines: RwLock<HashMap<String, Box<dyn ProtocolEngineFactory>>>,
}

impl EngineRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine factory
    ///
    /// # Parameters
    ///
    /// - `name`: Engine type name (e.g., "pcp", "natpmp")
    /// - `factory`: Factory object for creating engine instances
    ///
    /// Registering a name twice replaces the earlier factory.
    pub fn register_engine(&self, name: impl Into<String>, factory: Box<dyn ProtocolEngineFactory>) {
        let name = name.into();
        debug!("Registering protocol engine '{}'", name);
        let mut engines = self.engines.write().unwrap_or_else(PoisonError::into_inner);
        engines.insert(name, factory);
    }

    /// Create the engine named by `config.engine`
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ProtocolEngine>)`: Created engine instance
    /// - `Err(Error)`: If the engine type is not registered or creation fails
    pub fn create_engine(&self, config: &PortForwardConfig) -> Result<Box<dyn ProtocolEngine>> {
        let engines = self.engines.read().unwrap_or_else(PoisonError::into_inner);

        let factory = engines
            .get(&config.engine)
            .ok_or_else(|| Error::config(format!("Unknown engine type: {}", config.engine)))?;

        factory.create(config)
    }

    /// List all registered engine types, sorted by name
    pub fn list_engines(&self) -> Vec<String> {
        let engines = self.engines.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = engines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if an engine type is registered
    pub fn has_engine(&self, name: &str) -> bool {
        let engines = self.engines.read().unwrap_or_else(PoisonError::into_inner);
        engines.contains_key(name)
    }
}
