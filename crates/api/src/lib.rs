//! REST surface for agent lifecycle operations
//!
//! Every response is a `{statusCode, data}` envelope; failures carry the
//! message under `data.error`.

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, Result};
pub use state::ApiState;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The `/agent/v1` router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/agent/v1/list", get(routes::list))
        .route("/agent/v1/details/{agent_id}", get(routes::details))
        .route("/agent/v1/llm-calls/{agent_id}", get(routes::llm_calls))
        .route("/agent/v1/start", post(routes::start))
        .route("/agent/v1/feedback", post(routes::feedback))
        .route("/agent/v1/resume-hil", post(routes::resume_hil))
        .route("/agent/v1/resume-error", post(routes::resume_error))
        .route("/agent/v1/resume-completed", post(routes::resume_completed))
        .route("/agent/v1/cancel", post(routes::cancel))
        .route("/agent/v1/update-functions", post(routes::update_functions))
        .route("/agent/v1/force-stop", post(routes::force_stop))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits
pub async fn serve(state: ApiState, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ApiError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(%addr, "REST server listening");

    axum::serve(listener, router(state))
        .await
        .map_err(ApiError::Serve)
}
