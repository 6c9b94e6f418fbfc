use agentry_agent::AgentRunner;
use agentry_context::{AgentParams, LlmTiers, RunningState};
use std::sync::Arc;

use crate::dto::StartRequest;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    runner: AgentRunner,
    defaults: Arc<AgentParams>,
}

impl ApiState {
    /// `defaults` fills in whatever a start request leaves out
    pub fn new(runner: AgentRunner, defaults: AgentParams) -> Self {
        Self {
            runner,
            defaults: Arc::new(defaults),
        }
    }

    pub fn runner(&self) -> &AgentRunner {
        &self.runner
    }

    pub(crate) fn params_for(&self, request: StartRequest, user: String) -> AgentParams {
        let defaults = self.defaults.as_ref();
        AgentParams {
            name: request.name.unwrap_or_else(|| defaults.name.clone()),
            user,
            user_prompt: request.user_prompt,
            system_prompt: request
                .system_prompt
                .unwrap_or_else(|| defaults.system_prompt.clone()),
            budget: request.budget.unwrap_or(defaults.budget),
            hil_budget: request.hil_budget.unwrap_or(defaults.hil_budget),
            hil_count: request.count.unwrap_or(defaults.hil_count),
            llms: LlmTiers {
                easy: request.llm_easy.unwrap_or_else(|| defaults.llms.easy.clone()),
                medium: request
                    .llm_medium
                    .unwrap_or_else(|| defaults.llms.medium.clone()),
                hard: request.llm_hard.unwrap_or_else(|| defaults.llms.hard.clone()),
                xhard: request
                    .llm_xhard
                    .unwrap_or_else(|| defaults.llms.xhard.clone()),
            },
            functions: request
                .functions
                .unwrap_or_else(|| defaults.functions.clone()),
            workspace: defaults.workspace.clone(),
            state: RunningState::Agent,
        }
    }
}
