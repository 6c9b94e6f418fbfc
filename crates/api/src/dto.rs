//! Request and response bodies

use agentry_context::{ExecutionContext, RunningState};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// `{statusCode, data}` success body
pub struct Envelope<T>(pub T);

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(json!({
            "statusCode": StatusCode::OK.as_u16(),
            "data": self.0,
        }))
        .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub name: Option<String>,
    pub user_prompt: String,
    pub system_prompt: Option<String>,
    pub functions: Option<Vec<String>>,
    pub budget: Option<f64>,
    /// Iterations between human checkpoints
    pub count: Option<u32>,
    pub hil_budget: Option<f64>,
    pub llm_easy: Option<String>,
    pub llm_medium: Option<String>,
    pub llm_hard: Option<String>,
    pub llm_xhard: Option<String>,
}

/// Body shared by feedback and the resume operations
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub agent_id: String,
    #[serde(default)]
    pub execution_id: String,
    pub feedback: Option<String>,
    pub instructions: Option<String>,
}

impl ResumeRequest {
    pub fn text(&self) -> &str {
        self.feedback
            .as_deref()
            .or(self.instructions.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub agent_id: String,
    #[serde(default)]
    pub execution_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFunctionsRequest {
    pub agent_id: String,
    pub functions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceStopRequest {
    pub agent_id: String,
}

/// Where an agent stands after a lifecycle operation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub agent_id: String,
    pub execution_id: String,
    pub state: RunningState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cost: f64,
}

impl From<ExecutionContext> for RunSummary {
    fn from(ctx: ExecutionContext) -> Self {
        Self {
            agent_id: ctx.agent_id,
            execution_id: ctx.execution_id,
            state: ctx.state,
            error: ctx.error,
            cost: ctx.cost,
        }
    }
}
