//! Audit record of a single model invocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GenerateRequest, Generation};

/// One model invocation, persisted independently of the execution context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmCall {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// What the call was for, e.g. `plan` or `repair`
    pub description: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

impl LlmCall {
    /// Start a record for a request about to be sent
    pub fn begin(description: impl Into<String>, model: impl Into<String>, request: &GenerateRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: None,
            execution_id: None,
            description: description.into(),
            model: model.into(),
            system_prompt: request.system_prompt.clone(),
            prompt: request.prompt.clone(),
            response: None,
            error: None,
            request_time: Utc::now(),
            duration_ms: 0,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
        }
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn complete(mut self, generation: &Generation) -> Self {
        self.response = Some(generation.text.clone());
        self.duration_ms = generation.duration_ms;
        self.input_tokens = generation.usage.prompt_tokens;
        self.output_tokens = generation.usage.completion_tokens;
        self.cost = generation.cost;
        if !generation.model.is_empty() {
            self.model = generation.model.clone();
        }
        self
    }

    pub fn fail(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self.duration_ms = (Utc::now() - self.request_time).num_milliseconds().max(0) as u64;
        self
    }
}
