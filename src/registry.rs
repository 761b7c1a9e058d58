// src/registry.rs
// Declarative tool registry. Built once at startup, immutable afterwards,
// safe for concurrent reads without locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServerError};
use crate::tenancy::TenantScope;

/// Context threaded through every tool execution: resolved scope,
/// correlation id, and the cancellation token linked to the request.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    pub scope: TenantScope,
    pub correlation_id: String,
    pub cancel: CancellationToken,
    /// Permissions granted to the caller's principal.
    pub permissions: Vec<String>,
}

impl ToolCallContext {
    pub fn new(scope: TenantScope) -> Self {
        Self {
            scope,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            permissions: vec!["tools".into()],
        }
    }
}

/// A tool implementation: validated arguments in, JSON result out.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, ctx: &ToolCallContext, args: Value) -> Result<Value>;
}

/// Blanket impl so plain async closures can register as handlers.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ToolCallContext, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value>> + Send,
{
    async fn execute(&self, ctx: &ToolCallContext, args: Value) -> Result<Value> {
        (self.0)(ctx.clone(), args).await
    }
}

/// Everything the engine knows about one tool. Immutable after server start.
pub struct ToolRegistration {
    pub name: String,
    pub description: String,
    pub category: String,
    /// Permissions the caller must hold.
    pub permissions: Vec<String>,
    pub timeout: Duration,
    pub retryable: bool,
    pub input_schema: Value,
    pub output_shape: Option<Value>,
    pub handler: Arc<dyn ToolHandler>,
    validator: jsonschema::Validator,
}

impl ToolRegistration {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        permissions: Vec<String>,
        timeout: Duration,
        retryable: bool,
        input_schema: Value,
        output_shape: Option<Value>,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<Self> {
        let validator = jsonschema::validator_for(&input_schema)
            .map_err(|e| ServerError::Internal(format!("invalid tool schema: {e}")))?;
        Ok(Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            permissions,
            timeout,
            retryable,
            input_schema,
            output_shape,
            handler,
            validator,
        })
    }

    /// Validate call arguments against the registered input schema.
    pub fn validate_args(&self, args: &Value) -> Result<()> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(args)
            .map(|e| format!("{}: {e}", e.instance_path()))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServerError::SchemaInvalid(errors.join("; ")))
        }
    }
}

/// Registry mapping tool name to registration. Published once behind an Arc.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<HashMap<String, Arc<ToolRegistration>>>,
}

impl ToolRegistry {
    pub fn new(registrations: Vec<ToolRegistration>) -> Self {
        let tools = registrations
            .into_iter()
            .map(|r| (r.name.clone(), Arc::new(r)))
            .collect();
        Self {
            tools: Arc::new(tools),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolRegistration>> {
        self.tools.get(name).cloned()
    }

    /// Registrations sorted by name so tools/list is order-stable.
    pub fn list(&self) -> Vec<Arc<ToolRegistration>> {
        let mut out: Vec<_> = self.tools.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn execute(&self, _ctx: &ToolCallContext, args: Value) -> Result<Value> {
            Ok(args)
        }
    }

    fn registration(name: &str) -> ToolRegistration {
        ToolRegistration::new(
            name,
            "test tool",
            "test",
            vec!["tools".into()],
            Duration::from_secs(5),
            false,
            json!({
                "type": "object",
                "properties": { "value": { "type": "string" } },
                "required": ["value"]
            }),
            None,
            Arc::new(Echo),
        )
        .unwrap()
    }

    #[test]
    fn list_is_sorted_by_name() {
        let registry = ToolRegistry::new(vec![registration("zeta"), registration("alpha")]);
        let names: Vec<_> = registry.list().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn schema_validation_rejects_missing_required() {
        let reg = registration("t");
        assert!(reg.validate_args(&json!({ "value": "ok" })).is_ok());
        let err = reg.validate_args(&json!({})).unwrap_err();
        assert!(matches!(err, ServerError::SchemaInvalid(_)));
        let err = reg.validate_args(&json!({ "value": 42 })).unwrap_err();
        assert!(matches!(err, ServerError::SchemaInvalid(_)));
    }
}
