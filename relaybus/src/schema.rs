//! The schema interface, an optional collaborator. Only the root `BusPath`
//! exposes schema access; children fail with `SchemaOnlyOnRoot`.
//!
//! There is deliberately no `validate_response` method here: how a response
//! should be validated against a schema, and whether that should share any
//! logic with parameter validation, is left to whoever needs it. A
//! transport or application layer that wants response validation should
//! call `validate_parameters` explicitly with whatever semantics it
//! decides are correct, rather than this crate guessing at a shared
//! meaning between the two.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BusResult;

/// JSON-schema-shaped documents for an RPC or event's parameters/response.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// The combined schema document for an event or RPC.
    async fn get_event_or_rpc_schema(&self, api_name: &str, name: &str) -> BusResult<Value>;

    /// The schema document for an RPC (parameters + response).
    async fn get_rpc_schema(&self, api_name: &str, name: &str) -> BusResult<Value>;

    /// Validate `parameters` against the declared schema for `api_name.name`.
    async fn validate_parameters(
        &self,
        api_name: &str,
        name: &str,
        parameters: &Value,
    ) -> BusResult<()>;
}

/// No-op schema provider: every lookup fails with `SchemaNotFound`, and
/// validation always succeeds. Used when no schema document is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSchemaProvider;

#[async_trait]
impl SchemaProvider for NullSchemaProvider {
    async fn get_event_or_rpc_schema(&self, api_name: &str, name: &str) -> BusResult<Value> {
        Err(crate::error::BusError::SchemaNotFound {
            name: format!("{api_name}.{name}"),
        })
    }

    async fn get_rpc_schema(&self, api_name: &str, name: &str) -> BusResult<Value> {
        Err(crate::error::BusError::SchemaNotFound {
            name: format!("{api_name}.{name}"),
        })
    }

    async fn validate_parameters(
        &self,
        _api_name: &str,
        _name: &str,
        _parameters: &Value,
    ) -> BusResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn null_schema_provider_accepts_any_parameters() {
        let provider = NullSchemaProvider;
        provider
            .validate_parameters("auth", "greet", &json!({"name": "x"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn null_schema_provider_has_no_schemas() {
        let provider = NullSchemaProvider;
        assert!(provider.get_rpc_schema("auth", "greet").await.is_err());
    }
}
