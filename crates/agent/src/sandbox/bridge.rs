//! Host functions exposed inside the script engine
//!
//! Every method of the agent's active classes becomes a `Class_method`
//! function in the engine. A call converts its arguments to JSON, names them
//! from the schema, dispatches on the async runtime under the agent's
//! context and records the outcome in the call history.

use agentry_context::{ambient, names, FunctionCallResult, SharedContext};
use rhai::{Dynamic, Engine, EvalAltResult, Position};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::cancel::CancellationSignal;
use crate::functions::{value_to_string, Dispatcher, FunctionCall, FunctionSchema};

/// Overloads are registered up to this many positional arguments
pub const MAX_ARITY: usize = 6;

/// Placeholder recorded instead of memory payloads
pub const MEMORY_PLACEHOLDER: &str = "(see memory entry)";

type HostResult = Result<Dynamic, Box<EvalAltResult>>;

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    let message: String = message.into();
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

/// Shared state behind every bridged function of one script run
pub struct Bridge {
    dispatcher: Arc<Dispatcher>,
    ctx: SharedContext,
    cancel: CancellationSignal,
    handle: Handle,
    agent_id: String,
    active: Vec<String>,
}

impl Bridge {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        ctx: SharedContext,
        cancel: CancellationSignal,
        handle: Handle,
    ) -> Self {
        let (agent_id, active) = {
            let c = ambient::lock(&ctx);
            (c.agent_id.clone(), c.functions.clone())
        };
        Self {
            dispatcher,
            ctx,
            cancel,
            handle,
            agent_id,
            active,
        }
    }

    /// Schemas of the functions this bridge exposes
    pub fn schemas(&self) -> Vec<FunctionSchema> {
        self.dispatcher.registry().schemas_for(&self.active)
    }

    /// Register every active function on `engine`
    pub fn install(self: &Arc<Self>, engine: &mut Engine) {
        for schema in self.schemas() {
            let name = schema.sandbox_name();
            let arity = schema.parameters.len().min(MAX_ARITY);
            let schema = Arc::new(schema);
            for n in 0..=arity {
                self.register(engine, &name, n, &schema);
            }
        }
    }

    fn register(self: &Arc<Self>, engine: &mut Engine, name: &str, arity: usize, schema: &Arc<FunctionSchema>) {
        let bridge = Arc::clone(self);
        let schema = Arc::clone(schema);
        let call = move |args: Vec<Dynamic>| bridge.call(&schema, args);

        match arity {
            0 => {
                engine.register_fn(name, move || call(vec![]));
            }
            1 => {
                engine.register_fn(name, move |a: Dynamic| call(vec![a]));
            }
            2 => {
                engine.register_fn(name, move |a: Dynamic, b: Dynamic| call(vec![a, b]));
            }
            3 => {
                engine.register_fn(name, move |a: Dynamic, b: Dynamic, c: Dynamic| {
                    call(vec![a, b, c])
                });
            }
            4 => {
                engine.register_fn(
                    name,
                    move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| call(vec![a, b, c, d]),
                );
            }
            5 => {
                engine.register_fn(
                    name,
                    move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic, e: Dynamic| {
                        call(vec![a, b, c, d, e])
                    },
                );
            }
            _ => {
                engine.register_fn(
                    name,
                    move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic, e: Dynamic, f: Dynamic| {
                        call(vec![a, b, c, d, e, f])
                    },
                );
            }
        }
    }

    /// Body of every bridged function. Runs on the blocking thread.
    fn call(&self, schema: &FunctionSchema, args: Vec<Dynamic>) -> HostResult {
        if self.cancel.is_requested(&self.agent_id) {
            return Err(runtime_error("agent force stopped"));
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in &args {
            values.push(rhai::serde::from_dynamic::<Value>(arg)?);
        }
        let parameters = name_arguments(schema, values).map_err(runtime_error)?;
        let call = FunctionCall {
            function_name: schema.qualified_name(),
            parameters,
        };
        debug!(agent_id = %self.agent_id, function = %call.function_name, "script call");

        let outcome = self.handle.block_on(ambient::with_context(
            Arc::clone(&self.ctx),
            self.dispatcher.dispatch(&self.active, &call),
        ));

        match outcome {
            Ok(value) => {
                self.record(FunctionCallResult::success(
                    call.function_name.clone(),
                    call.parameters,
                    value_to_string(&value),
                ));
                rhai::serde::to_dynamic(value)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(agent_id = %self.agent_id, function = %call.function_name, "call failed: {}", message);
                self.record(FunctionCallResult::failure(
                    call.function_name.clone(),
                    call.parameters,
                    message.clone(),
                ));
                Err(runtime_error(message))
            }
        }
    }

    fn record(&self, result: FunctionCallResult) {
        ambient::lock(&self.ctx).append_call(redact(result));
    }
}

/// Name positional script arguments after the schema's parameters.
///
/// A lone map passed to a function taking several parameters is already
/// named and is used as is.
pub fn name_arguments(schema: &FunctionSchema, values: Vec<Value>) -> Result<Map<String, Value>, String> {
    let ordered = schema.ordered_parameters();
    if values.len() == 1 && ordered.len() >= 2 {
        if let Value::Object(map) = &values[0] {
            return Ok(map.clone());
        }
    }
    if values.len() > ordered.len() {
        return Err(format!(
            "{} takes at most {} argument(s), got {}",
            schema.qualified_name(),
            ordered.len(),
            values.len()
        ));
    }
    Ok(ordered
        .into_iter()
        .zip(values)
        .map(|(param, value)| (param.name.clone(), value))
        .collect())
}

/// Keep memory payloads out of the history
fn redact(mut result: FunctionCallResult) -> FunctionCallResult {
    match result.function_name.as_str() {
        names::AGENT_SAVE_MEMORY => {
            if let Some(content) = result.parameters.get_mut("content") {
                *content = Value::String(MEMORY_PLACEHOLDER.to_string());
            }
        }
        names::AGENT_GET_MEMORY => {
            if result.stdout.is_some() {
                result.stdout = Some(MEMORY_PLACEHOLDER.to_string());
            }
        }
        _ => {}
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::schema::parse_metadata;
    use serde_json::json;

    fn schema() -> FunctionSchema {
        parse_metadata(
            r#"[{"class":"TestFunctions","name":"sum","parameters":[
                {"index":1,"name":"b","type":"number"},
                {"index":0,"name":"a","type":"number"}
            ]}]"#,
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_positional_arguments_named_in_order() {
        let named = name_arguments(&schema(), vec![json!(1), json!(2)]).unwrap();
        assert_eq!(named.get("a"), Some(&json!(1)));
        assert_eq!(named.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_single_map_is_named_arguments() {
        let named = name_arguments(&schema(), vec![json!({"b": 5, "a": 4})]).unwrap();
        assert_eq!(named.len(), 2);
        assert_eq!(named.get("b"), Some(&json!(5)));
    }

    #[test]
    fn test_too_many_arguments() {
        let err = name_arguments(&schema(), vec![json!(1), json!(2), json!(3)]).unwrap_err();
        assert!(err.contains("at most 2"));
    }

    #[test]
    fn test_memory_redaction() {
        let mut params = Map::new();
        params.insert("key".to_string(), json!("notes"));
        params.insert("content".to_string(), json!("a very long document"));
        let saved = redact(FunctionCallResult::success(names::AGENT_SAVE_MEMORY, params, "null"));
        assert_eq!(saved.parameters["content"], json!(MEMORY_PLACEHOLDER));
        assert_eq!(saved.parameters["key"], json!("notes"));

        let got = redact(FunctionCallResult::success(
            names::AGENT_GET_MEMORY,
            Map::new(),
            "a very long document",
        ));
        assert_eq!(got.stdout.as_deref(), Some(MEMORY_PLACEHOLDER));

        let failed = redact(FunctionCallResult::failure(
            names::AGENT_GET_MEMORY,
            Map::new(),
            "no memory entry 'x'",
        ));
        assert!(failed.stdout.is_none());
        assert_eq!(failed.stderr.as_deref(), Some("no memory entry 'x'"));
    }
}
