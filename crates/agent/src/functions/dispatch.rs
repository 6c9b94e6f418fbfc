//! Resolve and invoke `Class.method` calls

use agentry_context::ambient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::{with_retry, FunctionCache};
use super::registry::{FunctionRegistry, ResolvedFunction};
use super::schema::FunctionSchema;
use crate::DispatchError;

/// A requested call with named arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub function_name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            parameters: Map::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// Resolves calls against the registry, consulting the cache
pub struct Dispatcher {
    registry: Arc<FunctionRegistry>,
    cache: Arc<FunctionCache>,
}

impl Dispatcher {
    pub fn new(registry: Arc<FunctionRegistry>, cache: Arc<FunctionCache>) -> Self {
        Self { registry, cache }
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<FunctionCache> {
        &self.cache
    }

    /// Split `Class.method` and resolve it among the `active` classes
    pub fn resolve(&self, active: &[String], function_name: &str) -> Result<ResolvedFunction, DispatchError> {
        match function_name.split_once('.') {
            Some((class, method)) if !class.is_empty() && !method.is_empty() => {
                self.registry.resolve(active, class, method)
            }
            _ => Err(DispatchError::FunctionNotFound {
                name: function_name.to_string(),
                available: self
                    .registry
                    .schemas_for(active)
                    .iter()
                    .map(FunctionSchema::qualified_name)
                    .collect(),
            }),
        }
    }

    /// Execute `call`. Errors raised by the method come back unchanged.
    pub async fn dispatch(&self, active: &[String], call: &FunctionCall) -> Result<Value, DispatchError> {
        let resolved = self.resolve(active, &call.function_name)?;
        let args = place_arguments(&resolved.schema, &call.parameters)?;
        let function = resolved.schema.qualified_name();
        debug!(function = %function, args = args.len(), "dispatching");

        let instance = resolved.instance;
        let method = resolved.schema.name.clone();
        let invoke = || {
            let instance = Arc::clone(&instance);
            let method = method.clone();
            let args = args.clone();
            async move { instance.invoke(&method, args).await }
        };

        let Some(scope) = resolved.schema.cache else {
            return Ok(invoke().await?);
        };

        let agent_id = ambient::current().map(|ctx| ambient::lock(&ctx).agent_id.clone());
        match super::cache::FunctionCache::scope_key(scope, agent_id.as_deref()) {
            Some(scope_key) => Ok(self
                .cache
                .get_or_compute(&scope_key, &function, &args, invoke)
                .await?),
            None => {
                warn!(function = %function, "agent-scoped cache outside an agent run");
                Ok(with_retry(self.cache.retry_policy(), invoke).await?)
            }
        }
    }
}

/// Order call arguments to match the method signature.
///
/// No arguments: none. One argument: passed positionally whatever its name.
/// Two or more: matched by name, missing optionals become `null`.
pub fn place_arguments(
    schema: &FunctionSchema,
    parameters: &Map<String, Value>,
) -> Result<Vec<Value>, DispatchError> {
    match parameters.len() {
        0 => Ok(Vec::new()),
        1 => Ok(parameters.values().cloned().collect()),
        _ => {
            let ordered = schema.ordered_parameters();
            if let Some(unknown) = parameters.keys().find(|k| schema.parameter(k).is_none()) {
                return Err(DispatchError::InvalidParameter {
                    function: schema.qualified_name(),
                    name: unknown.clone(),
                    valid: schema.parameter_names(),
                });
            }

            let mut args = Vec::with_capacity(ordered.len());
            for param in ordered {
                match parameters.get(&param.name) {
                    Some(value) => args.push(value.clone()),
                    None if param.optional => args.push(Value::Null),
                    None => {
                        return Err(DispatchError::MissingParameter {
                            function: schema.qualified_name(),
                            name: param.name.clone(),
                        })
                    }
                }
            }
            // Trailing nulls for absent optionals are not passed
            while matches!(args.last(), Some(Value::Null)) {
                args.pop();
            }
            Ok(args)
        }
    }
}
