//! Persistence for execution contexts and model call records

use agentry_context::ExecutionContext;
use agentry_provider::LlmCall;
use async_trait::async_trait;
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::{FileAgentStore, FileLlmCallStore};
pub use memory::{MemoryAgentStore, MemoryLlmCallStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("agent '{0}' not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Snapshots of execution contexts keyed by agent id
#[async_trait]
pub trait AgentStateStore: Send + Sync {
    /// Overwrite the snapshot for `ctx.agent_id`
    async fn save(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Fails with [`StoreError::NotFound`] for an unknown id
    async fn load(&self, agent_id: &str) -> Result<ExecutionContext>;

    /// Every stored context, oldest first
    async fn list(&self) -> Result<Vec<ExecutionContext>>;

    /// Contexts not in a terminal state
    async fn list_running(&self) -> Result<Vec<ExecutionContext>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|ctx| !ctx.is_terminal())
            .collect())
    }

    /// Remove a snapshot; returns whether it existed
    async fn delete(&self, agent_id: &str) -> Result<bool>;
}

/// Append-only audit log of model invocations
#[async_trait]
pub trait LlmCallStore: Send + Sync {
    async fn record(&self, call: &LlmCall) -> Result<()>;

    /// Calls linked to `agent_id`, in recording order
    async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<LlmCall>>;
}

fn sort_contexts(contexts: &mut [ExecutionContext]) {
    contexts.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });
}

/// File name stem for a key, replacing path separators
pub(crate) fn safe_key(key: &str) -> String {
    key.replace([':', '/', '\\'], "_")
}
