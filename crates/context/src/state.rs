//! Agent running states

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ContextError;

/// Where an agent is in its lifecycle. Exactly one value at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunningState {
    /// Non-interactive pure-function run
    Workflow,
    /// Autonomous planning
    Agent,
    /// Executing the planned script
    Functions,
    Error,
    /// Stopped at a budget or iteration threshold
    HitlThreshold,
    /// Waiting for approval of a tool call
    HitlTool,
    /// Waiting for a human answer to `Agent.requestFeedback`
    HitlFeedback,
    Completed,
    Shutdown,
    /// Waiting on child agents
    ChildAgents,
    Timeout,
}

impl RunningState {
    pub const ALL: [RunningState; 11] = [
        RunningState::Workflow,
        RunningState::Agent,
        RunningState::Functions,
        RunningState::Error,
        RunningState::HitlThreshold,
        RunningState::HitlTool,
        RunningState::HitlFeedback,
        RunningState::Completed,
        RunningState::Shutdown,
        RunningState::ChildAgents,
        RunningState::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunningState::Workflow => "workflow",
            RunningState::Agent => "agent",
            RunningState::Functions => "functions",
            RunningState::Error => "error",
            RunningState::HitlThreshold => "hitl_threshold",
            RunningState::HitlTool => "hitl_tool",
            RunningState::HitlFeedback => "hitl_feedback",
            RunningState::Completed => "completed",
            RunningState::Shutdown => "shutdown",
            RunningState::ChildAgents => "child_agents",
            RunningState::Timeout => "timeout",
        }
    }

    /// Map a persisted value to its canonical state, folding legacy aliases.
    ///
    /// `hil` and `feedback` were written by older versions for what is now
    /// `hitl_feedback`.
    pub fn normalize(raw: &str) -> Option<RunningState> {
        match raw.trim() {
            "hil" | "feedback" => Some(RunningState::HitlFeedback),
            other => Self::ALL.iter().copied().find(|s| s.as_str() == other),
        }
    }

    /// `completed`, `error` and `shutdown` end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunningState::Completed | RunningState::Error | RunningState::Shutdown
        )
    }

    /// Paused waiting for a human
    pub fn is_hitl(&self) -> bool {
        matches!(
            self,
            RunningState::HitlThreshold | RunningState::HitlTool | RunningState::HitlFeedback
        )
    }
}

impl fmt::Display for RunningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunningState {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s).ok_or_else(|| ContextError::UnknownState(s.to_string()))
    }
}

impl Serialize for RunningState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunningState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
