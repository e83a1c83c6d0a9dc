//! Error kinds propagated by the bus core.
//!
//! One enum carries every failure kind, each with the fields needed for
//! its own message, expressed with `thiserror` rather than hand-rolled
//! `Display`/`std::error::Error` impls.

use serde_json::Value;
use thiserror::Error;

/// Result alias used throughout the bus core.
pub type BusResult<T> = std::result::Result<T, BusError>;

/// All error kinds the bus core defines and propagates.
#[derive(Debug, Error)]
pub enum BusError {
    /// Registry lookup missed (`Registry::get`).
    #[error("no API named '{name}' is registered on this bus")]
    UnknownApi { name: String },

    /// A type/class was added to the registry in place of a constructed
    /// instance. Rust has no type/instance confusion at the value level,
    /// so this kind is retained for API parity but is raised only by the
    /// builder's name-validation path (an empty or reserved API name).
    #[error("invalid registry entry for '{name}': {reason}")]
    InvalidApiRegistryEntry { name: String, reason: String },

    /// `Registry::add` called with a name already present.
    #[error("an API named '{name}' is already registered")]
    DuplicateApi { name: String },

    /// `Api::get_event` missed.
    #[error("no event named '{api_name}.{event_name}'")]
    EventNotFound { api_name: String, event_name: String },

    /// `Api::call` missed (surfaced to the remote caller as a `ResultMessage`).
    #[error("no procedure named '{api_name}.{procedure_name}'")]
    ProcedureNotFound {
        api_name: String,
        procedure_name: String,
    },

    /// Positional arguments supplied to a call/fire, or an event's kwargs
    /// did not match its declared argument names exactly.
    #[error("invalid parameters for '{name}': {reason}")]
    InvalidParameters { name: String, reason: String },

    /// `EventTransport::consume` called with an empty `listen_for` list.
    #[error("nothing to listen for: listen_for was empty")]
    NothingToListenFor,

    /// A named `BusPath` node was constructed without a parent.
    #[error("a BusPath node may only be nameless at the root")]
    InvalidBusPathConfiguration,

    /// Underlying transport connectivity failure.
    #[error("transport error: {0}")]
    TransportError(String),

    /// No `ResultMessage` arrived before the effective timeout.
    #[error("RPC '{canonical_name}' timed out after {timeout_secs:.3}s")]
    RpcTimeout {
        canonical_name: String,
        timeout_secs: f64,
    },

    /// A `ResultMessage` with `error = true` was delivered to the caller.
    #[error("remote error from '{canonical_name}': {result}")]
    RemoteError {
        canonical_name: String,
        result: Value,
        trace: String,
    },

    /// Schema lookup missed.
    #[error("no schema found for '{name}'")]
    SchemaNotFound { name: String },

    /// `BusPath::schema` called on a non-root node.
    #[error("schema access is only available on the root BusPath node")]
    SchemaOnlyOnRoot,

    /// Schema validation rejected the supplied parameters.
    #[error("schema validation failed for '{name}': {reason}")]
    SchemaValidation { name: String, reason: String },
}
