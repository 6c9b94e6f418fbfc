//! Reserved agent operations and memory

use agentry_context::ambient;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{Args, FunctionClass};
use crate::FunctionError;

/// `Agent.*`: completion, feedback and memory on the ambient context
#[derive(Debug, Default)]
pub struct AgentFunctions;

impl AgentFunctions {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FunctionClass for AgentFunctions {
    fn name(&self) -> &str {
        "Agent"
    }

    fn methods(&self) -> &[&'static str] {
        &[
            "completed",
            "requestFeedback",
            "saveMemory",
            "getMemory",
            "deleteMemory",
        ]
    }

    fn metadata(&self) -> &'static str {
        include_str!("../../metadata/agent.json")
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
        match method {
            "completed" => {
                let args = Args::new("completed", args);
                Ok(json!(args.optional_string(0).unwrap_or_default()))
            }
            // The control loop pauses when it sees this call at the end of a script
            "requestFeedback" => Ok(Value::Null),
            "saveMemory" => {
                let args = Args::new("saveMemory", args);
                let key = args.string(0, "key")?;
                let content = args.string(1, "content")?;
                ambient::with_current(|ctx| {
                    debug!(agent_id = %ctx.agent_id, key = %key, "saving memory");
                    ctx.memory.insert(key, content);
                    ctx.touch();
                })?;
                Ok(Value::Null)
            }
            "getMemory" => {
                let args = Args::new("getMemory", args);
                let key = args.string(0, "key")?;
                ambient::with_current(|ctx| ctx.memory.get(&key).cloned())?
                    .map(Value::String)
                    .ok_or_else(|| FunctionError::Failed(format!("no memory entry '{}'", key)))
            }
            "deleteMemory" => {
                let args = Args::new("deleteMemory", args);
                let key = args.string(0, "key")?;
                let existed = ambient::with_current(|ctx| ctx.memory.remove(&key).is_some())?;
                Ok(json!(existed))
            }
            other => Err(FunctionError::UnknownMethod {
                class: "Agent".to_string(),
                method: other.to_string(),
            }),
        }
    }
}
