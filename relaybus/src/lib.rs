//! Relaybus is a hierarchical RPC + publish/subscribe message bus.
//!
//! It unifies two interaction modes over a pluggable transport layer:
//! synchronous remote procedure calls with return values, and asynchronous
//! publish/subscribe events. Clients address remote procedures and events
//! through a hierarchical dotted path (e.g. `auth.get_user`) that resolves
//! to an API — a named collection of callable procedures and named events
//! registered on some peer.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use relaybus::{BusBuilder, BusClient, BusPath};
//!
//! let builder = BusBuilder::new();
//! builder.register(MyApi::new())?;
//! let registry = Arc::new(builder.build());
//!
//! let client = Arc::new(
//!     BusClient::new(registry, rpc_transport, result_transport, event_transport, config)
//! );
//! let bus = BusPath::root(client);
//! let greeting = bus.child("auth").child("greet").call(kwargs, None)?;
//! ```
//!
//! This crate defines the contracts a transport plugin must satisfy; see
//! the companion `relaybus-memory` crate for a concrete, in-process
//! implementation used by this crate's own tests.

pub mod api;
pub mod builder;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod path;
pub mod registry;
pub mod schema;
pub mod transport;

pub use api::{Api, ApiMeta, Event};
pub use builder::BusBuilder;
pub use client::BusClient;
pub use config::{ApiConfig, BusConfig, TransportSelector};
pub use consumer::EventListenerFn;
pub use error::{BusError, BusResult};
pub use message::{kwargs, EventKey, EventMessage, Message, ResultMessage, RpcMessage};
pub use path::BusPath;
pub use registry::Registry;
pub use schema::{NullSchemaProvider, SchemaProvider};
pub use transport::{EventStream, EventTransport, Options, ResultTransport, RpcStream, RpcTransport};
