//! Bus Path: the hierarchical dotted-path façade.
//!
//! Rather than reflective attribute-chasing (`bus.auth.users.get(...)`),
//! addressing here is an explicit `child`/`path` builder:
//! `root.child("auth").child("users").call(...)` or the shorthand
//! `root.path(&["auth", "users"]).call(...)`. The resolution rule —
//! ancestor names above the root, below the leaf, joined by `.` — applies
//! either way.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::client::BusClient;
use crate::consumer::EventListenerFn;
use crate::error::{BusError, BusResult};
use crate::transport::Options;

/// A node in the bus addressing tree. The root node is nameless and has no
/// parent; every other node has a name and a parent.
pub struct BusPath {
    name: String,
    parent: Option<Arc<BusPath>>,
    client: Arc<BusClient>,
}

impl BusPath {
    /// Construct a node directly. Fails with `InvalidBusPathConfiguration`
    /// if a name is supplied without a parent — only the root may be
    /// nameless.
    pub fn new(
        name: impl Into<String>,
        parent: Option<Arc<BusPath>>,
        client: Arc<BusClient>,
    ) -> BusResult<Self> {
        let name = name.into();
        if parent.is_none() && !name.is_empty() {
            return Err(BusError::InvalidBusPathConfiguration);
        }
        Ok(BusPath {
            name,
            parent,
            client,
        })
    }

    /// The nameless, parentless root of a bus addressing tree.
    pub fn root(client: Arc<BusClient>) -> Arc<Self> {
        Arc::new(Self::new(String::new(), None, client).expect("root construction is always valid"))
    }

    /// A single child of this node.
    pub fn child(self: &Arc<Self>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(
            Self::new(name, Some(self.clone()), self.client.clone())
                .expect("a node constructed with a parent is always valid"),
        )
    }

    /// A descendant reached by chaining `child` once per segment — the
    /// explicit alternative to reflective attribute-chasing.
    pub fn path(self: &Arc<Self>, segments: &[&str]) -> Arc<Self> {
        let mut node = self.clone();
        for segment in segments {
            node = node.child(*segment);
        }
        node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<BusPath>> {
        self.parent.as_ref()
    }

    /// This node (if `include_self`) and every ancestor up to and
    /// including the root, nearest first.
    pub fn ancestors(self: &Arc<Self>, include_self: bool) -> Vec<Arc<BusPath>> {
        let mut result = Vec::new();
        let mut current = self.clone();
        loop {
            let is_self = Arc::ptr_eq(&current, self);
            if !is_self || include_self {
                result.push(current.clone());
            }
            match current.parent.clone() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        result
    }

    fn path_segments(self: &Arc<Self>, include_self: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .ancestors(include_self)
            .into_iter()
            .map(|n| n.name.clone())
            .collect();
        names.reverse();
        names
    }

    /// The dotted concatenation of all ancestor names above the root and
    /// below this leaf: `bus.auth.users.get` resolves to
    /// `api_name = "auth.users"`.
    pub fn api_name(self: &Arc<Self>) -> String {
        let names = self.path_segments(false);
        if names.len() <= 1 {
            String::new()
        } else {
            names[1..].join(".")
        }
    }

    /// The dotted path including this leaf's own name.
    pub fn fully_qualified_name(self: &Arc<Self>) -> String {
        let names = self.path_segments(true);
        if names.len() <= 1 {
            String::new()
        } else {
            names[1..].join(".")
        }
    }

    /// Shell-style introspection: for this node's path, the names of
    /// matching APIs (partial matches contribute their next path segment;
    /// an exact match contributes the API's own member names).
    pub fn matching_names(self: &Arc<Self>) -> Vec<String> {
        let path = self.path_segments(true);
        let api_names = self.client.registry().names();

        let mut partial_matches = Vec::new();
        let mut exact_matches = Vec::new();
        for api_name in &api_names {
            let mut segments = vec![String::new()];
            segments.extend(api_name.split('.').map(str::to_string));
            if segments == path {
                exact_matches.push(api_name.clone());
            } else if segments.len() > path.len() && segments[..path.len()] == path[..] {
                partial_matches.push(segments[path.len()].clone());
            }
        }

        for api_name in exact_matches {
            if let Ok(api) = self.client.registry().get(&api_name) {
                partial_matches.extend(api.member_names());
            }
        }
        partial_matches
    }

    /// Call this node's procedure asynchronously. There is no
    /// positional-argument entry point at all — Rust's type system
    /// rejects positional arguments by construction rather than by a
    /// runtime check.
    pub async fn call_async(
        self: &Arc<Self>,
        kwargs: Map<String, Value>,
        bus_options: Option<Options>,
    ) -> BusResult<Value> {
        self.client
            .call_rpc_remote(
                &self.api_name(),
                &self.name,
                kwargs,
                bus_options.unwrap_or_default(),
            )
            .await
    }

    /// Call this node's procedure synchronously, blocking the current
    /// thread. Uses an outer timeout of `rpc_timeout * 1.5`, since
    /// `call_async` (via `BusClient::call_rpc_remote`) already enforces
    /// the base `rpc_timeout` — this is a backstop against the inner
    /// timeout never firing, not the primary timeout mechanism.
    pub fn call(
        self: &Arc<Self>,
        kwargs: Map<String, Value>,
        bus_options: Option<Options>,
    ) -> BusResult<Value> {
        let rpc_timeout = self
            .client
            .config()
            .api(&self.api_name())
            .rpc_timeout
            .mul_f64(1.5);
        block_on_with_timeout(
            self.call_async(kwargs, bus_options),
            rpc_timeout,
            self.fully_qualified_name(),
        )
    }

    /// Fire this node's event asynchronously.
    pub async fn fire_async(
        self: &Arc<Self>,
        kwargs: Map<String, Value>,
        bus_options: Option<Options>,
    ) -> BusResult<()> {
        self.client
            .fire_event(
                &self.api_name(),
                &self.name,
                kwargs,
                bus_options.unwrap_or_default(),
            )
            .await
    }

    /// Fire this node's event synchronously, blocking the current thread
    /// for up to the API's `event_fire_timeout`.
    pub fn fire(
        self: &Arc<Self>,
        kwargs: Map<String, Value>,
        bus_options: Option<Options>,
    ) -> BusResult<()> {
        let timeout = self.client.config().api(&self.api_name()).event_fire_timeout;
        block_on_with_timeout(
            self.fire_async(kwargs, bus_options),
            timeout,
            self.fully_qualified_name(),
        )
    }

    /// Register `listener` under `listener_name` for this node's
    /// `(api_name, name)` pair.
    pub fn listen(
        self: &Arc<Self>,
        listener_name: impl Into<String>,
        listener: EventListenerFn,
    ) -> BusResult<()> {
        self.client
            .listen_for_event(&self.api_name(), &self.name, &listener_name.into(), listener)
    }

    /// Schema access is only available on the root node.
    pub fn schema(&self) -> BusResult<Arc<dyn crate::schema::SchemaProvider>> {
        if self.parent.is_some() {
            return Err(BusError::SchemaOnlyOnRoot);
        }
        Ok(self.client.schema())
    }
}

/// Drive `fut` to completion with an outer timeout, using the current
/// Tokio runtime if one is already driving this thread, or a dedicated
/// current-thread runtime otherwise. The blocking façade is derived from
/// the async one this way, rather than a separate implementation of the
/// same plumbing.
fn block_on_with_timeout<T>(
    fut: impl std::future::Future<Output = BusResult<T>>,
    timeout: Duration,
    canonical_name: String,
) -> BusResult<T> {
    let wrapped = async move {
        match tokio::time::timeout(timeout, fut).await {
            Ok(inner) => inner,
            Err(_) => Err(BusError::RpcTimeout {
                canonical_name,
                timeout_secs: timeout.as_secs_f64(),
            }),
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(wrapped)),
        Err(_) => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build a runtime for a blocking bus call");
            rt.block_on(wrapped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Api, ApiMeta};
    use crate::builder::BusBuilder;
    use crate::config::{ApiConfig, BusConfig};
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;

    struct Greeter(ApiMeta);
    #[async_trait]
    impl Api for Greeter {
        fn meta(&self) -> &ApiMeta {
            &self.0
        }
        async fn call(&self, procedure: &str, kwargs: Map<String, Value>) -> BusResult<Value> {
            match procedure {
                "greet" => Ok(json!(format!(
                    "hi {}",
                    kwargs.get("name").and_then(Value::as_str).unwrap_or("")
                ))),
                _ => Err(BusError::ProcedureNotFound {
                    api_name: self.0.name.clone(),
                    procedure_name: procedure.to_string(),
                }),
            }
        }
    }

    struct LoopbackRpc;
    #[async_trait]
    impl crate::transport::RpcTransport for LoopbackRpc {
        async fn call_rpc(&self, _m: &crate::message::RpcMessage, _o: &Options) -> BusResult<()> {
            Ok(())
        }
        async fn consume_rpcs(&self, _apis: Vec<String>) -> BusResult<crate::transport::RpcStream> {
            Ok(Box::pin(stream::empty()))
        }
    }

    struct ImmediateResult;
    #[async_trait]
    impl crate::transport::ResultTransport for ImmediateResult {
        async fn get_return_path(&self, _m: &crate::message::RpcMessage) -> BusResult<String> {
            Ok("p".to_string())
        }
        async fn send_result(
            &self,
            _m: &crate::message::RpcMessage,
            _r: &crate::message::ResultMessage,
            _p: &str,
        ) -> BusResult<()> {
            Ok(())
        }
        async fn receive_result(
            &self,
            m: &crate::message::RpcMessage,
            _p: &str,
            _o: &Options,
        ) -> BusResult<crate::message::ResultMessage> {
            Ok(crate::message::ResultMessage::success(
                m.id.clone(),
                json!(format!(
                    "hi {}",
                    m.kwargs.get("name").and_then(Value::as_str).unwrap_or("")
                )),
            ))
        }
    }

    struct NoEvents;
    #[async_trait]
    impl crate::transport::EventTransport for NoEvents {
        async fn send_event(&self, _m: &crate::message::EventMessage, _o: &Options) -> BusResult<()> {
            Ok(())
        }
        fn fetch(
            &self,
            _listen_for: Vec<crate::message::EventKey>,
            _context: Options,
        ) -> crate::transport::EventStream {
            Box::pin(stream::empty())
        }
    }

    fn test_root() -> Arc<BusPath> {
        let builder = BusBuilder::new();
        builder.register(Greeter(ApiMeta::new("auth"))).unwrap();
        let registry = Arc::new(builder.build());
        let client = Arc::new(crate::client::BusClient::new(
            registry,
            Arc::new(LoopbackRpc),
            Arc::new(ImmediateResult),
            Arc::new(NoEvents),
            BusConfig::new(ApiConfig::default()),
        ));
        BusPath::root(client)
    }

    #[test]
    fn resolution_matches_nested_path() {
        let root = test_root();
        let leaf = root.child("a").child("b").child("c");
        assert_eq!(leaf.api_name(), "a.b");
        assert_eq!(leaf.fully_qualified_name(), "a.b.c");
    }

    #[test]
    fn path_shorthand_matches_chained_child() {
        let root = test_root();
        let via_path = root.path(&["a", "b", "c"]);
        let via_child = root.child("a").child("b").child("c");
        assert_eq!(via_path.fully_qualified_name(), via_child.fully_qualified_name());
    }

    #[test]
    fn named_root_is_rejected() {
        let root = test_root();
        let err = BusPath::new("oops", None, root.client.clone()).unwrap_err();
        assert!(matches!(err, BusError::InvalidBusPathConfiguration));
    }

    #[tokio::test]
    async fn greet_call_returns_expected_result() {
        let root = test_root();
        let mut kwargs = Map::new();
        kwargs.insert("name".into(), json!("x"));
        let result = root
            .child("auth")
            .child("greet")
            .call_async(kwargs, None)
            .await
            .unwrap();
        assert_eq!(result, json!("hi x"));
    }

    #[test]
    fn schema_is_root_only() {
        let root = test_root();
        assert!(root.schema().is_ok());
        let child = root.child("auth");
        assert!(matches!(
            child.schema().unwrap_err(),
            BusError::SchemaOnlyOnRoot
        ));
    }
}
