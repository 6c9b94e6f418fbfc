//! JSON file backed stores

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::*;

/// One `<agentId>.json` file per context
pub struct FileAgentStore {
    dir: PathBuf,
}

impl FileAgentStore {
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn agent_path(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_key(agent_id)))
    }
}

#[async_trait]
impl AgentStateStore for FileAgentStore {
    async fn save(&self, ctx: &ExecutionContext) -> Result<()> {
        let path = self.agent_path(&ctx.agent_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(ctx)?;

        // Readers never see a half-written snapshot
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(agent_id = %ctx.agent_id, state = %ctx.state, "saved agent");
        Ok(())
    }

    async fn load(&self, agent_id: &str) -> Result<ExecutionContext> {
        let path = self.agent_path(agent_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(agent_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn list(&self) -> Result<Vec<ExecutionContext>> {
        let mut contexts = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<ExecutionContext>(&content) {
                Ok(ctx) => contexts.push(ctx),
                Err(e) => warn!("Failed to parse {}: {}", path.display(), e),
            }
        }

        sort_contexts(&mut contexts);
        Ok(contexts)
    }

    async fn delete(&self, agent_id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.agent_path(agent_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// One JSON-lines file per agent
pub struct FileLlmCallStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLlmCallStore {
    /// Calls not linked to an agent
    pub const UNASSIGNED: &'static str = "unassigned";

    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn log_path(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", safe_key(agent_id)))
    }
}

#[async_trait]
impl LlmCallStore for FileLlmCallStore {
    async fn record(&self, call: &LlmCall) -> Result<()> {
        let agent_id = call.agent_id.as_deref().unwrap_or(Self::UNASSIGNED);
        let mut line = serde_json::to_string(call)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(agent_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<LlmCall>> {
        let content = match tokio::fs::read_to_string(self.log_path(agent_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut calls = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<LlmCall>(line) {
                Ok(call) => calls.push(call),
                Err(e) => warn!("Skipping malformed llm call record for {}: {}", agent_id, e),
            }
        }
        Ok(calls)
    }
}
