//! Handlers for `/agent/v1`

use agentry_agent::AgentError;
use agentry_context::ExecutionContext;
use agentry_provider::LlmCall;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use tracing::{debug, info};

use crate::dto::{
    CancelRequest, Envelope, ForceStopRequest, ListQuery, ResumeRequest, RunSummary,
    StartRequest, UpdateFunctionsRequest,
};
use crate::error::Result;
use crate::state::ApiState;

/// Header naming the calling user
pub const USER_HEADER: &str = "x-user-id";
const DEFAULT_USER: &str = "default";

fn caller(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string()
}

pub async fn list(
    State(state): State<ApiState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Envelope<Vec<ExecutionContext>>> {
    let Query(query) = query?;
    let contexts = if query.running {
        state.runner().list_running().await?
    } else {
        state.runner().list().await?
    };
    debug!(count = contexts.len(), running = query.running, "Listing agents");
    Ok(Envelope(contexts))
}

pub async fn details(
    State(state): State<ApiState>,
    Path(agent_id): Path<String>,
) -> Result<Envelope<ExecutionContext>> {
    Ok(Envelope(state.runner().details(&agent_id).await?))
}

pub async fn llm_calls(
    State(state): State<ApiState>,
    Path(agent_id): Path<String>,
) -> Result<Envelope<Vec<LlmCall>>> {
    // Unknown agents are a 404, not an empty list
    state.runner().details(&agent_id).await?;
    Ok(Envelope(state.runner().llm_calls(&agent_id).await?))
}

pub async fn start(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: std::result::Result<Json<StartRequest>, JsonRejection>,
) -> Result<Envelope<RunSummary>> {
    let Json(request) = body?;
    if request.user_prompt.trim().is_empty() {
        return Err(AgentError::InvalidRequest("userPrompt is empty".to_string()).into());
    }
    let params = state.params_for(request, caller(&headers));
    let ctx = state.runner().start(params).await?;
    info!(agent_id = %ctx.agent_id, "Started agent over REST");
    Ok(Envelope(ctx.into()))
}

pub async fn feedback(
    State(state): State<ApiState>,
    body: std::result::Result<Json<ResumeRequest>, JsonRejection>,
) -> Result<Envelope<RunSummary>> {
    let Json(request) = body?;
    let ctx = state
        .runner()
        .provide_feedback(&request.agent_id, &request.execution_id, request.text())
        .await?;
    Ok(Envelope(ctx.into()))
}

pub async fn resume_hil(
    State(state): State<ApiState>,
    body: std::result::Result<Json<ResumeRequest>, JsonRejection>,
) -> Result<Envelope<RunSummary>> {
    let Json(request) = body?;
    let ctx = state
        .runner()
        .resume_hil(&request.agent_id, &request.execution_id, request.text())
        .await?;
    Ok(Envelope(ctx.into()))
}

pub async fn resume_error(
    State(state): State<ApiState>,
    body: std::result::Result<Json<ResumeRequest>, JsonRejection>,
) -> Result<Envelope<RunSummary>> {
    let Json(request) = body?;
    let ctx = state
        .runner()
        .resume_error(&request.agent_id, &request.execution_id, request.text())
        .await?;
    Ok(Envelope(ctx.into()))
}

pub async fn resume_completed(
    State(state): State<ApiState>,
    body: std::result::Result<Json<ResumeRequest>, JsonRejection>,
) -> Result<Envelope<RunSummary>> {
    let Json(request) = body?;
    let ctx = state
        .runner()
        .resume_completed(&request.agent_id, &request.execution_id, request.text())
        .await?;
    Ok(Envelope(ctx.into()))
}

pub async fn cancel(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: std::result::Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Envelope<RunSummary>> {
    let Json(request) = body?;
    let reason = if request.reason.trim().is_empty() {
        "cancelled by user"
    } else {
        request.reason.as_str()
    };
    let ctx = state
        .runner()
        .cancel_agent(
            &request.agent_id,
            &request.execution_id,
            reason,
            &caller(&headers),
        )
        .await?;
    Ok(Envelope(ctx.into()))
}

pub async fn update_functions(
    State(state): State<ApiState>,
    body: std::result::Result<Json<UpdateFunctionsRequest>, JsonRejection>,
) -> Result<Envelope<ExecutionContext>> {
    let Json(request) = body?;
    let ctx = state
        .runner()
        .update_functions(&request.agent_id, request.functions)
        .await?;
    Ok(Envelope(ctx))
}

pub async fn force_stop(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: std::result::Result<Json<ForceStopRequest>, JsonRejection>,
) -> Result<Envelope<RunSummary>> {
    let Json(request) = body?;
    let ctx = state
        .runner()
        .force_stop(&request.agent_id, &caller(&headers))
        .await?;
    Ok(Envelope(ctx.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_defaults() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller(&headers), "default");

        headers.insert(USER_HEADER, HeaderValue::from_static("  "));
        assert_eq!(caller(&headers), "default");

        headers.insert(USER_HEADER, HeaderValue::from_static("alice"));
        assert_eq!(caller(&headers), "alice");
    }
}
