//! A concrete, in-process transport triple for `relaybus`.
//!
//! Ships one `Rpc`/`Result`/`Event` transport triple, backed entirely by
//! in-memory channels, so `relaybus`'s abstract contracts can be
//! exercised without a real network — the loopback fixture this crate's
//! own test suite and doc examples run against.
//!
//! Unlike a real transport, this one assumes a single process: `call_rpc`
//! and `send_event` deliver directly into the matching consumer's queue
//! rather than crossing any process boundary.

mod event;
mod result;
mod rpc;

pub use event::MemoryEventTransport;
pub use result::MemoryResultTransport;
pub use rpc::MemoryRpcTransport;

use std::sync::Arc;

use relaybus::{BusClient, BusConfig};

/// Convenience bundle: one of each transport kind, all sharing the same
/// in-process fabric, plus a helper to build a `BusClient` from them.
#[derive(Clone)]
pub struct MemoryTransports {
    pub rpc: Arc<MemoryRpcTransport>,
    pub result: Arc<MemoryResultTransport>,
    pub event: Arc<MemoryEventTransport>,
}

impl MemoryTransports {
    pub fn new() -> Self {
        MemoryTransports {
            rpc: Arc::new(MemoryRpcTransport::new()),
            result: Arc::new(MemoryResultTransport::new()),
            event: Arc::new(MemoryEventTransport::new()),
        }
    }

    /// Build a `BusClient` wired to this fabric's three transports.
    pub fn client(&self, registry: Arc<relaybus::Registry>, config: BusConfig) -> BusClient {
        BusClient::new(
            registry,
            self.rpc.clone(),
            self.result.clone(),
            self.event.clone(),
            config,
        )
    }
}

impl Default for MemoryTransports {
    fn default() -> Self {
        Self::new()
    }
}
