//! Common test utilities for agentry CLI tests
#![allow(dead_code)]

use agentry_context::{AgentParams, ExecutionContext, RunningState};
use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// An isolated home and data directory
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".agentry");

        Ok(Self { temp_dir, data_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.data_dir.join("agents")
    }

    /// The binary with HOME and AGENTRY_HOME pointed at the temp dir
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_agentry"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("AGENTRY_HOME", &self.data_dir);
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Write a config with an API key and a workspace inside the temp dir
    pub fn create_config(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let config = serde_json::json!({
            "providers": { "openrouter": { "apiKey": "sk-or-test" } },
            "agent": { "workspace": self.temp_dir.path().join("workspace") },
        });
        std::fs::write(self.config_file(), serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }

    /// Persist an agent snapshot the way the file store does
    pub fn seed_agent(&self, name: &str, state: RunningState) -> anyhow::Result<ExecutionContext> {
        let mut ctx = ExecutionContext::new(AgentParams {
            name: name.to_string(),
            user_prompt: format!("{} task", name),
            workspace: self.temp_dir.path().join("workspace"),
            ..Default::default()
        });
        ctx.state = state;

        std::fs::create_dir_all(self.agents_dir())?;
        std::fs::write(
            self.agents_dir().join(format!("{}.json", ctx.agent_id)),
            serde_json::to_string_pretty(&ctx)?,
        )?;
        Ok(ctx)
    }

    pub fn load_agent(&self, agent_id: &str) -> anyhow::Result<ExecutionContext> {
        let content = std::fs::read_to_string(self.agents_dir().join(format!("{}.json", agent_id)))?;
        Ok(serde_json::from_str(&content)?)
    }
}
