//! The Bus Client: orchestrates send/receive across transports and owns
//! the registry, configuration, and schema hooks.
//!
//! The return-path plumbing follows directly from `ResultTransport::get_return_path`
//! existing as a distinct step before `RpcTransport::call_rpc`: a call's
//! reply address is allocated before the call itself is ever published.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::Event;
use crate::config::BusConfig;
use crate::consumer::{self, EventListenerFn};
use crate::error::{BusError, BusResult};
use crate::message::{EventKey, EventMessage, RpcMessage};
use crate::registry::Registry;
use crate::schema::{NullSchemaProvider, SchemaProvider};
use crate::transport::{EventTransport, Options, ResultTransport, RpcTransport};

/// How long `shutdown()` waits for spawned consumer loops to notice
/// cancellation before giving up on them.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Orchestrates RPC calls and event publication/subscription across one
/// transport of each kind, plus the registry, config, and schema they
/// share.
pub struct BusClient {
    registry: Arc<Registry>,
    rpc_transport: Arc<dyn RpcTransport>,
    result_transport: Arc<dyn ResultTransport>,
    event_transport: Arc<dyn EventTransport>,
    config: BusConfig,
    schema: Option<Arc<dyn SchemaProvider>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_token: CancellationToken,
}

impl BusClient {
    pub fn new(
        registry: Arc<Registry>,
        rpc_transport: Arc<dyn RpcTransport>,
        result_transport: Arc<dyn ResultTransport>,
        event_transport: Arc<dyn EventTransport>,
        config: BusConfig,
    ) -> Self {
        BusClient {
            registry,
            rpc_transport,
            result_transport,
            event_transport,
            config,
            schema: None,
            tasks: Mutex::new(Vec::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The schema collaborator, falling back to a `NullSchemaProvider` if
    /// none was configured (schema access is optional, but `BusPath` wants
    /// an infallible handle to something).
    pub fn schema(&self) -> Arc<dyn SchemaProvider> {
        self.schema
            .clone()
            .unwrap_or_else(|| Arc::new(NullSchemaProvider))
    }

    /// Call a remote procedure and await its result.
    ///
    /// Builds the `RpcMessage`, asks the Result Transport for a return
    /// path, writes it into the message, dispatches via the RPC Transport,
    /// then awaits the `ResultMessage` within the API's `rpc_timeout`.
    pub async fn call_rpc_remote(
        &self,
        api_name: &str,
        name: &str,
        kwargs: Map<String, Value>,
        options: Options,
    ) -> BusResult<Value> {
        let mut rpc_message = RpcMessage::new(api_name, name, kwargs);
        let canonical_name = rpc_message.canonical_name();

        let return_path = self.result_transport.get_return_path(&rpc_message).await?;
        rpc_message.return_path = return_path.clone();

        self.rpc_transport.call_rpc(&rpc_message, &options).await?;

        let timeout = effective_timeout(&options, self.config.api(api_name).rpc_timeout);
        let result_message = match tokio::time::timeout(
            timeout,
            self.result_transport
                .receive_result(&rpc_message, &return_path, &options),
        )
        .await
        {
            Ok(inner) => inner?,
            Err(_) => {
                return Err(BusError::RpcTimeout {
                    canonical_name,
                    timeout_secs: timeout.as_secs_f64(),
                })
            }
        };

        if result_message.error {
            Err(BusError::RemoteError {
                canonical_name,
                result: result_message.result,
                trace: result_message.trace.unwrap_or_default(),
            })
        } else {
            Ok(result_message.result)
        }
    }

    /// Fire an event: validates `kwargs` against the event's declaration,
    /// then publishes via the Event Transport.
    pub async fn fire_event(
        &self,
        api_name: &str,
        name: &str,
        kwargs: Map<String, Value>,
        options: Options,
    ) -> BusResult<()> {
        let api = self.registry.get(api_name)?;
        let event: Event = api.get_event(name)?;
        let event_message = EventMessage::new(api_name, name, kwargs);
        event.validate(&event_message.canonical_name(), &event_message.kwargs)?;
        self.event_transport
            .send_event(&event_message, &options)
            .await
    }

    /// Register a named listener for one `(api_name, name)` pair and spawn
    /// its consumer loop.
    pub fn listen_for_event(
        &self,
        api_name: &str,
        name: &str,
        listener_name: &str,
        listener: EventListenerFn,
    ) -> BusResult<()> {
        let listen_for: Vec<EventKey> = vec![(api_name.to_string(), name.to_string())];
        let token = self.shutdown_token.child_token();
        let handle = consumer::spawn_event_consumer_loop(
            self.event_transport.clone(),
            listener_name.to_string(),
            listen_for,
            listener,
            token,
        );
        self.tasks.lock().push(handle);
        Ok(())
    }

    /// Start the RPC server loop over every locally-registered API.
    pub fn consume_rpcs(&self) -> BusResult<()> {
        let apis = self.registry.names();
        let token = self.shutdown_token.child_token();
        let handle = consumer::spawn_rpc_server_loop(
            self.registry.clone(),
            self.rpc_transport.clone(),
            self.result_transport.clone(),
            apis,
            token,
        );
        self.tasks.lock().push(handle);
        Ok(())
    }

    /// Cancel all running consumer loops, await their termination within a
    /// bounded grace period, and stop accepting new work.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut self.tasks.lock());
        for handle in handles {
            match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, handle).await {
                Ok(Ok(())) => debug!("consumer loop exited cleanly"),
                Ok(Err(e)) => warn!(error = %e, "consumer loop task panicked"),
                Err(_) => warn!("consumer loop did not exit within the shutdown grace period"),
            }
        }
    }
}

fn effective_timeout(options: &Options, default: Duration) -> Duration {
    options
        .get("timeout_secs")
        .and_then(Value::as_f64)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}
