//! Process-wide mapping from API name to API instance.
//!
//! A double-registration under the same name is a loud `DuplicateApi`
//! failure rather than a silent overwrite — the registry rejects rather
//! than replaces.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::Api;
use crate::error::{BusError, BusResult};

/// Process-wide, name-keyed collection of registered APIs.
///
/// Read-only once the bus is running; writes are expected only during
/// startup, via [`crate::builder::BusBuilder`].
#[derive(Default)]
pub struct Registry {
    apis: RwLock<HashMap<String, Arc<dyn Api>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            apis: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `api` under `name`. Fails with `DuplicateApi` if an API is
    /// already registered under that name.
    pub fn add(&self, name: impl Into<String>, api: Arc<dyn Api>) -> BusResult<()> {
        let name = name.into();
        let mut apis = self.apis.write();
        if apis.contains_key(&name) {
            return Err(BusError::DuplicateApi { name });
        }
        apis.insert(name, api);
        Ok(())
    }

    /// Look up a registered API by name.
    pub fn get(&self, name: &str) -> BusResult<Arc<dyn Api>> {
        self.apis
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::UnknownApi {
                name: name.to_string(),
            })
    }

    /// All registered API names, in an unspecified but stable order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.apis.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// All registered API instances.
    pub fn iterate(&self) -> Vec<Arc<dyn Api>> {
        self.apis.read().values().cloned().collect()
    }
}
