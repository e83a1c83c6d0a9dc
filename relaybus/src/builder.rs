//! Explicit API registration.
//!
//! Auto-registration at type-definition time encourages import-order bugs
//! and hidden global state, so registration here is always an explicit
//! call: `BusBuilder::register` is that entry point. Application startup
//! code constructs each `Api` instance and registers it one at a time, in
//! whatever order it pleases.

use std::sync::Arc;

use crate::api::Api;
use crate::error::{BusError, BusResult};
use crate::registry::Registry;

/// Accumulates API registrations ahead of constructing a `BusClient`.
#[derive(Default)]
pub struct BusBuilder {
    registry: Registry,
}

impl BusBuilder {
    pub fn new() -> Self {
        BusBuilder {
            registry: Registry::new(),
        }
    }

    /// Register an API instance under its own `meta().name`.
    ///
    /// Fails with `InvalidApiRegistryEntry` if the API's name is empty —
    /// a malformed registration attempt caught before it can corrupt the
    /// registry.
    pub fn register(&self, api: impl Api + 'static) -> BusResult<&Self> {
        let name = api.meta().name.clone();
        if name.is_empty() {
            return Err(BusError::InvalidApiRegistryEntry {
                name,
                reason: "API metadata must declare a non-empty name".to_string(),
            });
        }
        self.registry.add(name, Arc::new(api))?;
        Ok(self)
    }

    /// Consume the builder, yielding the populated, now-read-only registry.
    pub fn build(self) -> Registry {
        self.registry
    }
}
