//! Function classes callable by agents
//!
//! A class is a named group of async methods plus a metadata document
//! describing their parameters. The registry validates the two against each
//! other at startup; the dispatcher resolves `Class.method` names at run time.

pub mod agent;
pub mod cache;
pub mod dispatch;
pub mod filesystem;
pub mod path_utils;
pub mod registry;
pub mod schema;
pub mod testing;

pub use agent::AgentFunctions;
pub use cache::{FunctionCache, RetryPolicy};
pub use dispatch::{Dispatcher, FunctionCall};
pub use filesystem::FileSystemFunctions;
pub use registry::{FunctionRegistry, ResolvedFunction};
pub use schema::{CacheScope, FunctionSchema, ParameterSchema};
pub use testing::TestFunctions;

use async_trait::async_trait;
use serde_json::Value;

use crate::FunctionError;

/// A group of methods exposed to agents
#[async_trait]
pub trait FunctionClass: Send + Sync {
    fn name(&self) -> &str;

    /// Method names this class implements
    fn methods(&self) -> &[&'static str];

    /// JSON metadata document for the methods
    fn metadata(&self) -> &'static str;

    /// Invoke `method` with arguments already placed in declaration order
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, FunctionError>;
}

/// Positional arguments handed to a method
pub struct Args {
    method: &'static str,
    values: Vec<Value>,
}

impl Args {
    pub fn new(method: &'static str, values: Vec<Value>) -> Self {
        Self { method, values }
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    pub fn required(&self, index: usize, name: &str) -> Result<&Value, FunctionError> {
        self.value(index).ok_or_else(|| {
            FunctionError::InvalidArgument(format!("{} requires '{}'", self.method, name))
        })
    }

    pub fn string(&self, index: usize, name: &str) -> Result<String, FunctionError> {
        Ok(value_to_string(self.required(index, name)?))
    }

    pub fn optional_string(&self, index: usize) -> Option<String> {
        self.value(index).map(value_to_string)
    }

    pub fn number(&self, index: usize, name: &str) -> Result<f64, FunctionError> {
        let value = self.required(index, name)?;
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            FunctionError::InvalidArgument(format!(
                "{}: '{}' must be a number, got {}",
                self.method, name, value
            ))
        })
    }
}

/// Strings pass through unquoted; everything else is rendered as JSON
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_accessors() {
        let args = Args::new("sum", vec![json!(2), json!("3.5"), Value::Null]);
        assert_eq!(args.number(0, "a").unwrap(), 2.0);
        assert_eq!(args.number(1, "b").unwrap(), 3.5);
        assert!(args.value(2).is_none());
        assert!(matches!(
            args.required(2, "c"),
            Err(FunctionError::InvalidArgument(_))
        ));
        assert!(args.optional_string(5).is_none());
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("plain")), "plain");
        assert_eq!(value_to_string(&json!({"a": 1})), "{\"a\":1}");
    }
}
