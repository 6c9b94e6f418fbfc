//! API error type and its HTTP mapping

use agentry_agent::AgentError;
use agentry_store::StoreError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),

    #[error("invalid query: {0}")]
    Query(#[from] QueryRejection),

    #[error("{0}")]
    BadRequest(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Agent(err) => agent_status(err),
            ApiError::Body(_) | ApiError::Query(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Bind { .. } | ApiError::Serve(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn agent_status(err: &AgentError) -> StatusCode {
    match err {
        AgentError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        AgentError::InvalidState { .. }
        | AgentError::AlreadyExecuting(_)
        | AgentError::StillExecuting(_)
        | AgentError::ExecutionMismatch { .. } => StatusCode::CONFLICT,
        AgentError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        AgentError::InvalidRequest(_) | AgentError::Dispatch(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        let body = json!({
            "statusCode": status.as_u16(),
            "data": { "error": self.to_string() },
        });
        (status, Json(body)).into_response()
    }
}
