//! Build-time registry of available backends.
//!
//! Maps a backend name (the prefix of a profile id) to a constructor. A
//! profile whose backend is not registered is skipped by the caller, the
//! same way a missing optional backend would be.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Protocol;
use super::dummy::{self, DummyProtocol};
use crate::config::ClientConfig;

/// Constructor for one backend.
pub type ProtocolFactory = fn(&ClientConfig) -> Arc<dyn Protocol>;

/// Name → constructor map.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    factories: BTreeMap<&'static str, ProtocolFactory>,
}

impl ProtocolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every backend compiled into this binary.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(dummy::PROTOCOL_NAME, new_dummy);
        registry
    }

    /// Add or replace a backend.
    pub fn register(&mut self, name: &'static str, factory: ProtocolFactory) {
        self.factories.insert(name, factory);
    }

    /// Registered backend names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Instantiate the named backend, or `None` if it is not available.
    #[must_use]
    pub fn create(&self, name: &str, config: &ClientConfig) -> Option<Arc<dyn Protocol>> {
        let factory = self.factories.get(name)?;
        Some(factory(config))
    }
}

fn new_dummy(config: &ClientConfig) -> Arc<dyn Protocol> {
    Arc::new(DummyProtocol::new(config.dummy_latency))
}
