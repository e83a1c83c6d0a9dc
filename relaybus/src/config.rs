//! The configuration interface: a per-API structure carrying
//! `rpc_transport`/`result_transport`/`event_transport` selectors, and a
//! "transport selector" structure keyed by transport kind. Loading such a
//! structure from YAML/TOML/env is out of scope here — this module only
//! defines the lookup interface an already-loaded config must satisfy.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};

/// Names a transport kind plus its opaque, transport-specific config. The
/// core never interprets `config` — only the transport plugin it selects
/// does.
#[derive(Debug, Clone, Default)]
pub struct TransportSelector {
    pub kind: String,
    pub config: Value,
}

impl TransportSelector {
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        TransportSelector {
            kind: kind.into(),
            config,
        }
    }
}

/// Per-API configuration: at least `rpc_timeout`, `event_fire_timeout`,
/// and the chosen transport selectors.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub rpc_timeout: Duration,
    pub event_fire_timeout: Duration,
    pub rpc_transport: TransportSelector,
    pub result_transport: TransportSelector,
    pub event_transport: TransportSelector,
    /// Unrecognised keys, carried opaquely.
    pub extra: Map<String, Value>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            rpc_timeout: Duration::from_secs(5),
            event_fire_timeout: Duration::from_secs(5),
            rpc_transport: TransportSelector::default(),
            result_transport: TransportSelector::default(),
            event_transport: TransportSelector::default(),
            extra: Map::new(),
        }
    }
}

/// Maps API name to `ApiConfig`, falling back to a default entry.
#[derive(Debug, Clone, Default)]
pub struct BusConfig {
    default: ApiConfig,
    per_api: HashMap<String, ApiConfig>,
}

impl BusConfig {
    pub fn new(default: ApiConfig) -> Self {
        BusConfig {
            default,
            per_api: HashMap::new(),
        }
    }

    pub fn set_api(&mut self, api_name: impl Into<String>, config: ApiConfig) -> &mut Self {
        self.per_api.insert(api_name.into(), config);
        self
    }

    /// The effective configuration for `api_name`, falling back to the
    /// default entry when no API-specific override exists.
    pub fn api(&self, api_name: &str) -> &ApiConfig {
        self.per_api.get(api_name).unwrap_or(&self.default)
    }
}
