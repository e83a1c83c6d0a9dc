//! The three wire-level message kinds and their identity/metadata contract.
//!
//! Every message is immutable once constructed, serializes as a
//! `(metadata, kwargs)` pair, and is reconstructed via `from_dict`. The
//! split exists so a transport's serializer can carry `metadata` as
//! structured headers and `kwargs` as the payload body without the core
//! caring which.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{BusError, BusResult};

/// Generate a collision-free, time-ordered message id.
///
/// Uses UUID v7 (48-bit millisecond timestamp + random tail) encoded in a
/// URL-safe, unpadded base64 alphabet: time-ordered, with no host-MAC-derived
/// node id baked in, since `id` is meant to be treated as purely opaque.
pub fn new_id() -> String {
    let uuid = Uuid::now_v7();
    URL_SAFE_NO_PAD.encode(uuid.as_bytes())
}

/// Shared behaviour of all three message kinds.
pub trait Message: Sized {
    /// Metadata keys that must be present in `get_metadata()` for the
    /// message to be reconstructable via `from_dict`.
    fn required_metadata() -> &'static [&'static str];

    /// The non-kwarg fields of this message, for transport headers.
    fn get_metadata(&self) -> Map<String, Value>;

    /// The kwarg fields of this message, for the transport body.
    fn get_kwargs(&self) -> Map<String, Value>;

    /// Reconstruct a message from its metadata and kwargs. Must satisfy
    /// `T::from_dict(m.get_metadata(), m.get_kwargs()) == m` for every `m`.
    fn from_dict(metadata: Map<String, Value>, kwargs: Map<String, Value>) -> BusResult<Self>;
}

fn require<'a>(metadata: &'a Map<String, Value>, key: &str, owner: &str) -> BusResult<&'a Value> {
    metadata.get(key).ok_or_else(|| BusError::InvalidParameters {
        name: owner.to_string(),
        reason: format!("missing required metadata key '{key}'"),
    })
}

fn require_str(metadata: &Map<String, Value>, key: &str, owner: &str) -> BusResult<String> {
    require(metadata, key, owner)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BusError::InvalidParameters {
            name: owner.to_string(),
            reason: format!("metadata key '{key}' is not a string"),
        })
}

/// An RPC call: `api_name.procedure_name(kwargs)` plus a return path.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcMessage {
    pub id: String,
    pub api_name: String,
    pub procedure_name: String,
    pub kwargs: Map<String, Value>,
    /// Opaque routing token produced by the Result Transport. Empty before
    /// the call has been dispatched.
    pub return_path: String,
}

impl RpcMessage {
    pub fn new(
        api_name: impl Into<String>,
        procedure_name: impl Into<String>,
        kwargs: Map<String, Value>,
    ) -> Self {
        RpcMessage {
            id: new_id(),
            api_name: api_name.into(),
            procedure_name: procedure_name.into(),
            kwargs,
            return_path: String::new(),
        }
    }

    pub fn canonical_name(&self) -> String {
        format!("{}.{}", self.api_name, self.procedure_name)
    }
}

impl fmt::Display for RpcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .kwargs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.canonical_name(), args)
    }
}

impl Message for RpcMessage {
    fn required_metadata() -> &'static [&'static str] {
        &["id", "api_name", "procedure_name", "return_path"]
    }

    fn get_metadata(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("id".into(), Value::String(self.id.clone()));
        m.insert("api_name".into(), Value::String(self.api_name.clone()));
        m.insert(
            "procedure_name".into(),
            Value::String(self.procedure_name.clone()),
        );
        m.insert(
            "return_path".into(),
            Value::String(self.return_path.clone()),
        );
        m
    }

    fn get_kwargs(&self) -> Map<String, Value> {
        self.kwargs.clone()
    }

    fn from_dict(metadata: Map<String, Value>, kwargs: Map<String, Value>) -> BusResult<Self> {
        Ok(RpcMessage {
            id: require_str(&metadata, "id", "RpcMessage")?,
            api_name: require_str(&metadata, "api_name", "RpcMessage")?,
            procedure_name: require_str(&metadata, "procedure_name", "RpcMessage")?,
            return_path: require_str(&metadata, "return_path", "RpcMessage")?,
            kwargs,
        })
    }
}

/// The reply to an `RpcMessage`, success or failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage {
    pub id: String,
    pub rpc_message_id: String,
    pub result: Value,
    pub error: bool,
    pub trace: Option<String>,
}

impl ResultMessage {
    pub fn success(rpc_message_id: impl Into<String>, result: Value) -> Self {
        ResultMessage {
            id: new_id(),
            rpc_message_id: rpc_message_id.into(),
            result,
            error: false,
            trace: None,
        }
    }

    /// Build a failure result from a `BusError`, capturing its `Display`
    /// text as `result` and a source-chain walk as `trace`.
    pub fn failure(rpc_message_id: impl Into<String>, err: &(dyn std::error::Error)) -> Self {
        let mut trace = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push_str("\ncaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        ResultMessage {
            id: new_id(),
            rpc_message_id: rpc_message_id.into(),
            result: Value::String(err.to_string()),
            error: true,
            trace: Some(trace),
        }
    }
}

impl fmt::Display for ResultMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.result)
    }
}

impl Message for ResultMessage {
    fn required_metadata() -> &'static [&'static str] {
        &["rpc_message_id"]
    }

    fn get_metadata(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(
            "rpc_message_id".into(),
            Value::String(self.rpc_message_id.clone()),
        );
        m.insert("error".into(), Value::Bool(self.error));
        if self.error {
            if let Some(trace) = &self.trace {
                m.insert("trace".into(), Value::String(trace.clone()));
            }
        }
        m
    }

    fn get_kwargs(&self) -> Map<String, Value> {
        let mut k = Map::new();
        k.insert("result".into(), self.result.clone());
        k
    }

    fn from_dict(metadata: Map<String, Value>, mut kwargs: Map<String, Value>) -> BusResult<Self> {
        let rpc_message_id = require_str(&metadata, "rpc_message_id", "ResultMessage")?;
        let error = metadata
            .get("error")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let trace = metadata
            .get("trace")
            .and_then(Value::as_str)
            .map(str::to_string);
        let result = kwargs.remove("result").unwrap_or(Value::Null);
        Ok(ResultMessage {
            id: new_id(),
            rpc_message_id,
            result,
            error,
            trace,
        })
    }
}

/// A published event: `api_name.event_name(kwargs)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub id: String,
    pub api_name: String,
    pub event_name: String,
    pub kwargs: Map<String, Value>,
}

impl EventMessage {
    pub fn new(
        api_name: impl Into<String>,
        event_name: impl Into<String>,
        kwargs: Map<String, Value>,
    ) -> Self {
        EventMessage {
            id: new_id(),
            api_name: api_name.into(),
            event_name: event_name.into(),
            kwargs,
        }
    }

    pub fn canonical_name(&self) -> String {
        format!("{}.{}", self.api_name, self.event_name)
    }
}

impl fmt::Display for EventMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .kwargs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.canonical_name(), args)
    }
}

impl Message for EventMessage {
    fn required_metadata() -> &'static [&'static str] {
        &["api_name", "event_name"]
    }

    fn get_metadata(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("api_name".into(), Value::String(self.api_name.clone()));
        m.insert("event_name".into(), Value::String(self.event_name.clone()));
        m
    }

    fn get_kwargs(&self) -> Map<String, Value> {
        self.kwargs.clone()
    }

    fn from_dict(metadata: Map<String, Value>, kwargs: Map<String, Value>) -> BusResult<Self> {
        Ok(EventMessage {
            id: new_id(),
            api_name: require_str(&metadata, "api_name", "EventMessage")?,
            event_name: require_str(&metadata, "event_name", "EventMessage")?,
            kwargs,
        })
    }
}

/// A `(api_name, event_name)` pair, the unit of event-transport subscription.
pub type EventKey = (String, String);

/// Convenience for building `kwargs` maps in application code and tests.
pub fn kwargs(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Map<String, Value> {
    let mut m = Map::new();
    for (k, v) in pairs {
        m.insert(k.to_string(), v);
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn rpc_message_round_trips() {
        let mut m = RpcMessage::new("auth", "greet", kwargs([("name", json!("x"))]));
        m.return_path = "inbox-1".to_string();
        let rebuilt = RpcMessage::from_dict(m.get_metadata(), m.get_kwargs()).unwrap();
        assert_eq!(m, rebuilt);
        for key in RpcMessage::required_metadata() {
            assert!(m.get_metadata().contains_key(*key));
        }
    }

    #[test]
    fn result_message_round_trips() {
        let m = ResultMessage::success("abc", json!(42));
        let rebuilt = ResultMessage::from_dict(m.get_metadata(), m.get_kwargs()).unwrap();
        assert_eq!(m.rpc_message_id, rebuilt.rpc_message_id);
        assert_eq!(m.result, rebuilt.result);
        assert_eq!(m.error, rebuilt.error);
    }

    #[test]
    fn event_message_round_trips() {
        let m = EventMessage::new("auth", "logged_in", kwargs([("user", json!("x"))]));
        let rebuilt = EventMessage::from_dict(m.get_metadata(), m.get_kwargs()).unwrap();
        // `id` is not part of EventMessage's metadata contract, so
        // `from_dict` mints a fresh one; only the serializable fields
        // round-trip.
        assert_eq!(m.api_name, rebuilt.api_name);
        assert_eq!(m.event_name, rebuilt.event_name);
        assert_eq!(m.kwargs, rebuilt.kwargs);
    }

    #[test]
    fn failure_result_sets_error_and_trace() {
        let err = BusError::UnknownApi {
            name: "nope".to_string(),
        };
        let rm = ResultMessage::failure("abc", &err);
        assert!(rm.error);
        assert_eq!(rm.result, json!(err.to_string()));
        assert!(rm.trace.as_deref().unwrap_or("").len() > 0);
    }

    #[test]
    fn ids_are_unique_across_many_constructions() {
        let mut seen = HashSet::new();
        for _ in 0..50_000 {
            assert!(seen.insert(new_id()));
        }
    }
}
