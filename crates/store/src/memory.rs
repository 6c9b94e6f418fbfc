//! In-process stores, used by tests and ephemeral runs

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::*;

#[derive(Default)]
pub struct MemoryAgentStore {
    agents: RwLock<HashMap<String, ExecutionContext>>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStateStore for MemoryAgentStore {
    async fn save(&self, ctx: &ExecutionContext) -> Result<()> {
        self.agents
            .write()
            .await
            .insert(ctx.agent_id.clone(), ctx.clone());
        Ok(())
    }

    async fn load(&self, agent_id: &str) -> Result<ExecutionContext> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(agent_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<ExecutionContext>> {
        let mut contexts: Vec<_> = self.agents.read().await.values().cloned().collect();
        sort_contexts(&mut contexts);
        Ok(contexts)
    }

    async fn delete(&self, agent_id: &str) -> Result<bool> {
        Ok(self.agents.write().await.remove(agent_id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryLlmCallStore {
    calls: RwLock<Vec<LlmCall>>,
}

impl MemoryLlmCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<LlmCall> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl LlmCallStore for MemoryLlmCallStore {
    async fn record(&self, call: &LlmCall) -> Result<()> {
        self.calls.write().await.push(call.clone());
        Ok(())
    }

    async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<LlmCall>> {
        Ok(self
            .calls
            .read()
            .await
            .iter()
            .filter(|c| c.agent_id.as_deref() == Some(agent_id))
            .cloned()
            .collect())
    }
}
