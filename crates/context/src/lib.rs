//! Per-execution agent state
//!
//! `ExecutionContext` is everything one agent run owns: budget, memory,
//! call history, model tiers and its working directory. The `ambient`
//! module makes the running context reachable from any task inside the run
//! without threading it through every call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

pub mod ambient;
pub mod state;

pub use ambient::{add_cost, current, shared, with_context, SharedContext};
pub use state::RunningState;

/// Reserved function names the control loop reacts to
pub mod names {
    pub const AGENT_COMPLETED: &str = "Agent.completed";
    pub const AGENT_REQUEST_FEEDBACK: &str = "Agent.requestFeedback";
    pub const AGENT_SAVE_MEMORY: &str = "Agent.saveMemory";
    pub const AGENT_GET_MEMORY: &str = "Agent.getMemory";
}

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("no execution context is active")]
    NoContext,

    #[error("unknown running state '{0}'")]
    UnknownState(String),

    #[error("unknown model tier '{0}'")]
    UnknownTier(String),
}

pub type Result<T> = std::result::Result<T, ContextError>;

/// One dispatched call and its outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResult {
    /// `Class.method`
    pub function_name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl FunctionCallResult {
    pub fn success(
        function_name: impl Into<String>,
        parameters: Map<String, Value>,
        stdout: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            parameters,
            stdout: Some(stdout.into()),
            stderr: None,
        }
    }

    pub fn failure(
        function_name: impl Into<String>,
        parameters: Map<String, Value>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            parameters,
            stdout: None,
            stderr: Some(stderr.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.stderr.is_some()
    }
}

/// Task-complexity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Easy,
    Medium,
    Hard,
    Xhard,
}

impl FromStr for Tier {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Tier::Easy),
            "medium" => Ok(Tier::Medium),
            "hard" => Ok(Tier::Hard),
            "xhard" => Ok(Tier::Xhard),
            other => Err(ContextError::UnknownTier(other.to_string())),
        }
    }
}

/// Model id bound to each tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmTiers {
    pub easy: String,
    pub medium: String,
    pub hard: String,
    pub xhard: String,
}

impl LlmTiers {
    pub fn get(&self, tier: Tier) -> &str {
        match tier {
            Tier::Easy => &self.easy,
            Tier::Medium => &self.medium,
            Tier::Hard => &self.hard,
            Tier::Xhard => &self.xhard,
        }
    }
}

/// Working directory of one agent, independent of the process cwd
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemHandle {
    /// Paths may not escape this directory
    pub base_path: PathBuf,
    pub working_directory: PathBuf,
}

impl FileSystemHandle {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            working_directory: base_path.clone(),
            base_path,
        }
    }

    /// Join a relative path onto the working directory
    pub fn join(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_directory.join(path)
        }
    }
}

/// Settings for a brand new agent
#[derive(Debug, Clone)]
pub struct AgentParams {
    pub name: String,
    pub user: String,
    pub user_prompt: String,
    pub system_prompt: String,
    pub budget: f64,
    pub hil_budget: f64,
    pub hil_count: u32,
    pub llms: LlmTiers,
    pub functions: Vec<String>,
    pub workspace: PathBuf,
    pub state: RunningState,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            user: "default".to_string(),
            user_prompt: String::new(),
            system_prompt: String::new(),
            budget: 2.0,
            hil_budget: 1.0,
            hil_count: 5,
            llms: LlmTiers::default(),
            functions: vec!["Agent".to_string()],
            workspace: PathBuf::from("."),
            state: RunningState::Agent,
        }
    }
}

/// State of one agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub agent_id: String,
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<String>,
    pub trace_id: String,
    pub name: String,
    pub user: String,
    pub state: RunningState,
    pub input_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub function_call_history: Vec<FunctionCallResult>,
    #[serde(default)]
    pub memory: BTreeMap<String, String>,
    pub cost: f64,
    pub budget: f64,
    pub budget_remaining: f64,
    pub hil_budget: f64,
    pub hil_count: u32,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub count_since_hil: u32,
    pub llms: LlmTiers,
    /// Active function classes
    pub functions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub file_system: FileSystemHandle,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// When the current execution started
    pub execution_started_at: DateTime<Utc>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ExecutionContext {
    pub fn new(params: AgentParams) -> Self {
        let now = Utc::now();
        Self {
            agent_id: new_id(),
            execution_id: new_id(),
            parent_agent_id: None,
            trace_id: new_id(),
            name: params.name,
            user: params.user,
            state: params.state,
            input_prompt: params.user_prompt.clone(),
            user_prompt: params.user_prompt,
            system_prompt: params.system_prompt,
            function_call_history: Vec::new(),
            memory: BTreeMap::new(),
            cost: 0.0,
            budget: params.budget,
            budget_remaining: params.budget.max(0.0),
            hil_budget: params.hil_budget,
            hil_count: params.hil_count,
            iterations: 0,
            count_since_hil: 0,
            llms: params.llms,
            functions: params.functions,
            error: None,
            file_system: FileSystemHandle::new(params.workspace),
            created_at: now,
            last_update: now,
            execution_started_at: now,
        }
    }

    /// A child run: same tiers, functions and workspace, but its own ids,
    /// zero cost, empty history and memory.
    pub fn child(&self, name: impl Into<String>, user_prompt: impl Into<String>, budget: f64) -> Self {
        let mut child = ExecutionContext::new(AgentParams {
            name: name.into(),
            user: self.user.clone(),
            user_prompt: user_prompt.into(),
            system_prompt: self.system_prompt.clone(),
            budget,
            hil_budget: self.hil_budget,
            hil_count: self.hil_count,
            llms: self.llms.clone(),
            functions: self.functions.clone(),
            workspace: self.file_system.base_path.clone(),
            state: RunningState::Agent,
        });
        child.parent_agent_id = Some(self.agent_id.clone());
        child.trace_id = self.trace_id.clone();
        child.file_system.working_directory = self.file_system.working_directory.clone();
        child
    }

    /// Add spend and recompute `budget_remaining`, clamped at zero.
    ///
    /// Returns the remaining budget.
    pub fn add_cost(&mut self, delta: f64) -> f64 {
        if !delta.is_finite() || delta < 0.0 {
            warn!(agent_id = %self.agent_id, delta, "ignoring invalid cost delta");
            return self.budget_remaining;
        }
        self.cost += delta;
        self.budget_remaining = (self.budget - self.cost).max(0.0);
        self.touch();
        self.budget_remaining
    }

    /// Allow `amount` more spend on top of what has been spent so far
    pub fn raise_budget(&mut self, amount: f64) {
        self.budget = self.cost + amount;
        self.budget_remaining = amount.max(0.0);
        debug!(agent_id = %self.agent_id, budget = self.budget, "budget raised");
        self.touch();
    }

    pub fn append_call(&mut self, result: FunctionCallResult) {
        self.function_call_history.push(result);
        self.touch();
    }

    pub fn last_call(&self) -> Option<&FunctionCallResult> {
        self.function_call_history.last()
    }

    /// A trailing feedback request, which the next prompt shows as a result
    pub fn pending_feedback(&self) -> Option<&FunctionCallResult> {
        self.last_call()
            .filter(|call| call.function_name == names::AGENT_REQUEST_FEEDBACK)
    }

    /// History as shown in prompts: a pending feedback request is left out
    pub fn history_view(&self) -> &[FunctionCallResult] {
        let history = &self.function_call_history[..];
        if self.pending_feedback().is_some() {
            &history[..history.len() - 1]
        } else {
            history
        }
    }

    /// New execution id for a restart after a pause
    pub fn begin_execution(&mut self) {
        self.execution_id = new_id();
        self.execution_started_at = Utc::now();
        self.touch();
    }

    pub fn set_state(&mut self, state: RunningState) {
        if self.state != state {
            debug!(agent_id = %self.agent_id, from = %self.state, to = %state, "state change");
        }
        self.state = state;
        if state != RunningState::Error {
            self.error = None;
        }
        self.touch();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = RunningState::Error;
        self.error = Some(message.into());
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}
