//! API and event definitions: named collections of procedures and events.
//!
//! An `Api` implementation owns its own dispatch: `call` matches on the
//! procedure name and deserializes individual kwargs out of the map by
//! hand, the dynamic-by-name-dispatch-within-one-method-body idiom for a
//! runtime-registered set of operations in a statically typed language.
//! Registration happens explicitly through `BusBuilder::register` (see
//! `builder.rs`) rather than at type-definition time.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{BusError, BusResult};

/// A named slot on an API whose sole declarative attribute is the ordered
/// list of argument names it admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub arguments: Vec<String>,
}

impl Event {
    pub fn new(arguments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Event {
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    /// Validate that `kwargs` carries exactly the declared argument names,
    /// no more, no fewer.
    pub fn validate(&self, canonical_name: &str, kwargs: &Map<String, Value>) -> BusResult<()> {
        let declared: std::collections::HashSet<&str> =
            self.arguments.iter().map(String::as_str).collect();
        let supplied: std::collections::HashSet<&str> =
            kwargs.keys().map(String::as_str).collect();

        if declared != supplied {
            let mut missing: Vec<&str> = declared.difference(&supplied).copied().collect();
            let mut unexpected: Vec<&str> = supplied.difference(&declared).copied().collect();
            missing.sort_unstable();
            unexpected.sort_unstable();
            return Err(BusError::InvalidParameters {
                name: canonical_name.to_string(),
                reason: format!(
                    "kwargs do not match declared arguments (missing: {missing:?}, unexpected: {unexpected:?})"
                ),
            });
        }
        Ok(())
    }
}

/// Opaque per-API metadata. `name` is the one field the core requires;
/// everything else is carried verbatim and never interpreted.
/// Keys beginning with `_` are dropped.
#[derive(Debug, Clone, Default)]
pub struct ApiMeta {
    pub name: String,
    pub extra: HashMap<String, Value>,
}

impl ApiMeta {
    pub fn new(name: impl Into<String>) -> Self {
        ApiMeta {
            name: name.into(),
            extra: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !key.starts_with('_') {
            self.extra.insert(key, value);
        }
        self
    }
}

/// A named collection of procedures and events exposed on the bus.
///
/// Implementers supply `meta()` (their registration name and opaque
/// metadata), `call()` (procedure dispatch by name), and `events()`
/// (declared event slots by name).
#[async_trait]
pub trait Api: Send + Sync {
    /// The API's registration metadata; `meta().name` is immutable once
    /// the API has been registered.
    fn meta(&self) -> &ApiMeta;

    /// Invoke the named procedure with the given keyword arguments.
    /// Implementers should `match procedure` and deserialize individual
    /// kwargs out of the map; return `ProcedureNotFound` for unknown names.
    async fn call(&self, procedure: &str, kwargs: Map<String, Value>) -> BusResult<Value>;

    /// Look up a declared event by name.
    fn get_event(&self, name: &str) -> BusResult<Event> {
        let _ = name;
        Err(BusError::EventNotFound {
            api_name: self.meta().name.clone(),
            event_name: name.to_string(),
        })
    }

    /// Best-effort listing of this API's procedure and event names, used
    /// only by `BusPath`'s shell-style introspection. There is no runtime
    /// reflection to derive this automatically, so implementers may
    /// override it; the default reports nothing.
    fn member_names(&self) -> Vec<String> {
        Vec::new()
    }
}
