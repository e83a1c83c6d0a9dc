//! Transport contracts.
//!
//! Three independent capability traits model "a transport is a trait a
//! concrete type implements" rather than a base class concrete types
//! inherit from — composition over inheritance, with one trait per axis
//! (RPC dispatch, result rendezvous, event pub/sub) so a concrete
//! transport can implement only the capabilities it actually has.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::error::BusResult;
use crate::message::{EventKey, EventMessage, ResultMessage, RpcMessage};

/// Opaque, transport-specific option bag. The core never interprets its
/// contents beyond the handful of well-known keys documented per call site
/// (e.g. the effective timeout passed to `receive_result`).
pub type Options = Map<String, Value>;

/// A stream of incoming RPC calls, as yielded by `RpcTransport::consume_rpcs`.
pub type RpcStream = BoxStream<'static, RpcMessage>;

/// A stream of incoming events, as yielded by `EventTransport::fetch`.
pub type EventStream = BoxStream<'static, EventMessage>;

/// Publishes RPC calls and yields them to a consumer loop.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Publish a call to a remote procedure. Does not await a result —
    /// that is the `ResultTransport`'s concern.
    async fn call_rpc(&self, rpc_message: &RpcMessage, options: &Options) -> BusResult<()>;

    /// Consume RPC calls directed at any of the named local APIs. The
    /// returned stream may be unbounded; dropping it must release any
    /// consumer-side resources the transport allocated.
    async fn consume_rpcs(&self, apis: Vec<String>) -> BusResult<RpcStream>;
}

/// Computes return paths and ties an RPC call to its result.
#[async_trait]
pub trait ResultTransport: Send + Sync {
    /// Deterministically compute an opaque routing token for the reply to
    /// `rpc_message`. May suspend if the transport needs to allocate a
    /// rendezvous resource, but must not require network I/O at minimum.
    async fn get_return_path(&self, rpc_message: &RpcMessage) -> BusResult<String>;

    /// Deliver `result_message` to the caller identified by `return_path`.
    async fn send_result(
        &self,
        rpc_message: &RpcMessage,
        result_message: &ResultMessage,
        return_path: &str,
    ) -> BusResult<()>;

    /// Await the reply to `rpc_message` at `return_path`. `options` may
    /// carry a `"timeout_secs"` number; transports that can honour a
    /// timeout internally should use it, but `BusClient` enforces the
    /// effective timeout regardless.
    async fn receive_result(
        &self,
        rpc_message: &RpcMessage,
        return_path: &str,
        options: &Options,
    ) -> BusResult<ResultMessage>;
}

/// Publishes events and yields them to subscribed listeners.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Publish an event.
    async fn send_event(&self, event_message: &EventMessage, options: &Options) -> BusResult<()>;

    /// Subscribe to the given `(api_name, event_name)` pairs. An empty
    /// `listen_for` is a programmer error.
    fn consume(&self, listen_for: Vec<EventKey>, context: Options) -> BusResult<EventStream> {
        if listen_for.is_empty() {
            return Err(crate::error::BusError::NothingToListenFor);
        }
        Ok(self.fetch(listen_for, context))
    }

    /// Produce the subscription stream once `consume` has validated
    /// `listen_for` is non-empty. Events outside `listen_for` may still be
    /// yielded; the consumer runtime is responsible for filtering them.
    fn fetch(&self, listen_for: Vec<EventKey>, context: Options) -> EventStream;

    /// Signalled after a listener finishes successfully, so the transport
    /// may commit an offset or acknowledge. Not sent on listener failure.
    async fn consumption_complete(
        &self,
        event_message: &EventMessage,
        context: &Options,
    ) -> BusResult<()> {
        let _ = (event_message, context);
        Ok(())
    }

    /// Optional refinement: narrow an already-open subscription to include
    /// more keys. Default is a no-op for transports that always listen
    /// broadly.
    async fn start_listening_for(&self, keys: &[EventKey]) -> BusResult<()> {
        let _ = keys;
        Ok(())
    }

    /// Optional refinement: narrow an already-open subscription to exclude
    /// keys. Default is a no-op.
    async fn stop_listening_for(&self, keys: &[EventKey]) -> BusResult<()> {
        let _ = keys;
        Ok(())
    }
}
