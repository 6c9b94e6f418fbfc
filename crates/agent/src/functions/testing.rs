//! Deterministic functions for exercising the engine

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Args, FunctionClass};
use crate::FunctionError;

#[derive(Debug, Default)]
pub struct TestFunctions {
    token_calls: AtomicUsize,
    flaky_seen: Mutex<HashSet<String>>,
    flaky_calls: AtomicUsize,
}

impl TestFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times `randomToken` actually ran
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    /// Times `flaky` actually ran, failures included
    pub fn flaky_calls(&self) -> usize {
        self.flaky_calls.load(Ordering::SeqCst)
    }

    fn sum(args: Args) -> Result<Value, FunctionError> {
        let (a, b) = (args.required(0, "a")?, args.required(1, "b")?);
        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            if let Some(total) = x.checked_add(y) {
                return Ok(json!(total));
            }
        }
        Ok(json!(args.number(0, "a")? + args.number(1, "b")?))
    }

    fn flaky(&self, args: Args) -> Result<Value, FunctionError> {
        let key = args.string(0, "key")?;
        self.flaky_calls.fetch_add(1, Ordering::SeqCst);

        let first_time = self
            .flaky_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone());
        if first_time {
            Err(FunctionError::Transient(format!("{} not ready yet", key)))
        } else {
            Ok(json!(format!("ok:{}", key)))
        }
    }
}

#[async_trait]
impl FunctionClass for TestFunctions {
    fn name(&self) -> &str {
        "TestFunctions"
    }

    fn methods(&self) -> &[&'static str] {
        &["sum", "echo", "throwError", "randomToken", "flaky"]
    }

    fn metadata(&self) -> &'static str {
        include_str!("../../metadata/testing.json")
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
        match method {
            "sum" => Self::sum(Args::new("sum", args)),
            "echo" => Ok(args.into_iter().next().unwrap_or(Value::Null)),
            "throwError" => {
                let message = Args::new("throwError", args)
                    .optional_string(0)
                    .unwrap_or_else(|| "error".to_string());
                Err(FunctionError::Failed(message))
            }
            "randomToken" => {
                self.token_calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(uuid::Uuid::new_v4().simple().to_string()))
            }
            "flaky" => self.flaky(Args::new("flaky", args)),
            other => Err(FunctionError::UnknownMethod {
                class: "TestFunctions".to_string(),
                method: other.to_string(),
            }),
        }
    }
}
