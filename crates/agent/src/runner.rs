//! Agent lifecycle: start, resume, cancel and force stop
//!
//! The runner owns the set of executing agents. Only one control loop may
//! run per agent id, so every operation that would re-enter the loop first
//! claims the id and releases it when the loop stops.

use agentry_context::{
    ambient, names, AgentParams, ExecutionContext, FunctionCallResult, RunningState, SharedContext,
};
use agentry_provider::LlmCall;
use agentry_store::{AgentStateStore, LlmCallStore};
use serde_json::{json, Map};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cancel::{poll_until, CancellationSignal};
use crate::hitl::approve_all;
use crate::loop_agent::ControlLoop;
use crate::{AgentError, Result};

/// Whether operations wait for the control loop to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// Spawn the loop and return the saved context straight away
    #[default]
    Background,
    /// Return once the loop has stopped
    Foreground,
}

#[derive(Clone)]
pub struct AgentRunner {
    control: Arc<ControlLoop>,
    calls: Arc<dyn LlmCallStore>,
    executing: Arc<Mutex<HashMap<String, SharedContext>>>,
    mode: LaunchMode,
    poll_interval: Duration,
    stop_timeout: Duration,
}

impl AgentRunner {
    pub fn new(control: Arc<ControlLoop>, calls: Arc<dyn LlmCallStore>) -> Self {
        Self {
            control,
            calls,
            executing: Arc::new(Mutex::new(HashMap::new())),
            mode: LaunchMode::Background,
            poll_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Polling used by [`AgentRunner::force_stop`]
    pub fn with_stop_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.stop_timeout = timeout;
        self
    }

    pub fn control(&self) -> &Arc<ControlLoop> {
        &self.control
    }

    fn store(&self) -> &Arc<dyn AgentStateStore> {
        self.control.store()
    }

    pub fn is_executing(&self, agent_id: &str) -> bool {
        self.executing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(agent_id)
    }

    fn live(&self, agent_id: &str) -> Option<SharedContext> {
        self.executing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(agent_id)
            .cloned()
    }

    fn claim(&self, ctx: ExecutionContext) -> Result<SharedContext> {
        let mut executing = self.executing.lock().unwrap_or_else(|e| e.into_inner());
        if executing.contains_key(&ctx.agent_id) {
            return Err(AgentError::AlreadyExecuting(ctx.agent_id));
        }
        // A stop aimed at an earlier run must not end this one
        self.control.cancellation().take(&ctx.agent_id);
        let agent_id = ctx.agent_id.clone();
        let shared = ambient::shared(ctx);
        executing.insert(agent_id, Arc::clone(&shared));
        Ok(shared)
    }

    fn release(&self, agent_id: &str) {
        let mut executing = self.executing.lock().unwrap_or_else(|e| e.into_inner());
        executing.remove(agent_id);
        self.control.cancellation().take(agent_id);
    }

    /// Validate `params` and persist a new agent without running it
    pub async fn create(&self, params: AgentParams) -> Result<ExecutionContext> {
        self.control
            .dispatcher()
            .registry()
            .validate_classes(&params.functions)?;
        let ctx = ExecutionContext::new(params);
        self.store().save(&ctx).await?;
        info!(agent_id = %ctx.agent_id, name = %ctx.name, "Created agent");
        Ok(ctx)
    }

    /// Create an agent and run it
    pub async fn start(&self, params: AgentParams) -> Result<ExecutionContext> {
        let ctx = self.create(params).await?;
        self.launch(ctx).await
    }

    /// Start a child of `parent_id` sharing its tiers, functions and workspace
    pub async fn start_child(
        &self,
        parent_id: &str,
        name: &str,
        user_prompt: &str,
        budget: f64,
    ) -> Result<ExecutionContext> {
        let parent = self.details(parent_id).await?;
        let child = parent.child(name, user_prompt, budget);
        self.store().save(&child).await?;
        info!(agent_id = %child.agent_id, parent = %parent_id, "Created child agent");
        self.launch(child).await
    }

    /// Run an agent already in a runnable state
    async fn launch(&self, ctx: ExecutionContext) -> Result<ExecutionContext> {
        let snapshot = ctx.clone();
        let shared = self.claim(ctx)?;
        match self.mode {
            LaunchMode::Foreground => self.drive(shared).await,
            LaunchMode::Background => {
                let runner = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = runner.drive(shared).await {
                        error!("Agent loop stopped with error: {}", e);
                    }
                });
                Ok(snapshot)
            }
        }
    }

    async fn drive(&self, shared: SharedContext) -> Result<ExecutionContext> {
        let agent_id = ambient::lock(&shared).agent_id.clone();
        let result = self.control.run_shared(&shared).await;
        self.release(&agent_id);
        result?;
        let ctx = ambient::lock(&shared).clone();
        Ok(ctx)
    }

    /// Load `agent_id` for a resume: not executing, same execution, in one
    /// of the `expected` states
    async fn prepare(
        &self,
        agent_id: &str,
        execution_id: &str,
        expected: &[RunningState],
    ) -> Result<ExecutionContext> {
        if self.is_executing(agent_id) {
            return Err(AgentError::AlreadyExecuting(agent_id.to_string()));
        }
        let ctx = self.store().load(agent_id).await?;
        check_execution(&ctx, execution_id)?;
        if !expected.contains(&ctx.state) {
            let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
            return Err(AgentError::InvalidState {
                agent_id: agent_id.to_string(),
                expected: expected.join(" or "),
                actual: ctx.state,
            });
        }
        Ok(ctx)
    }

    /// Continue after a budget or iteration threshold was approved
    pub async fn resume_hil(
        &self,
        agent_id: &str,
        execution_id: &str,
        feedback: &str,
    ) -> Result<ExecutionContext> {
        let mut ctx = self
            .prepare(agent_id, execution_id, &[RunningState::HitlThreshold])
            .await?;
        approve_all(&mut ctx);
        apply_input(&mut ctx, feedback);
        ctx.begin_execution();
        ctx.set_state(RunningState::Agent);
        self.store().save(&ctx).await?;
        info!(agent_id, "Resuming after threshold approval");
        self.launch(ctx).await
    }

    /// Retry after an error or timeout with optional new instructions
    pub async fn resume_error(
        &self,
        agent_id: &str,
        execution_id: &str,
        instructions: &str,
    ) -> Result<ExecutionContext> {
        let mut ctx = self
            .prepare(
                agent_id,
                execution_id,
                &[RunningState::Error, RunningState::Timeout],
            )
            .await?;
        apply_input(&mut ctx, instructions);
        ctx.begin_execution();
        ctx.set_state(RunningState::Agent);
        self.store().save(&ctx).await?;
        info!(agent_id, "Resuming after error");
        self.launch(ctx).await
    }

    /// Continue a completed agent with follow-up instructions
    pub async fn resume_completed(
        &self,
        agent_id: &str,
        execution_id: &str,
        instructions: &str,
    ) -> Result<ExecutionContext> {
        let mut ctx = self
            .prepare(agent_id, execution_id, &[RunningState::Completed])
            .await?;
        apply_input(&mut ctx, instructions);
        ctx.begin_execution();
        ctx.set_state(RunningState::Agent);
        self.store().save(&ctx).await?;
        info!(agent_id, "Resuming completed agent");
        self.launch(ctx).await
    }

    /// Answer an `Agent.requestFeedback` call
    pub async fn provide_feedback(
        &self,
        agent_id: &str,
        execution_id: &str,
        feedback: &str,
    ) -> Result<ExecutionContext> {
        if feedback.trim().is_empty() {
            return Err(AgentError::InvalidRequest("feedback is empty".to_string()));
        }
        let mut ctx = self
            .prepare(agent_id, execution_id, &[RunningState::HitlFeedback])
            .await?;
        ctx.input_prompt = feedback.to_string();
        ctx.begin_execution();
        ctx.set_state(RunningState::Agent);
        self.store().save(&ctx).await?;
        info!(agent_id, "Resuming with feedback");
        self.launch(ctx).await
    }

    /// Ask a running agent to stop and wait for it to do so
    pub async fn force_stop(&self, agent_id: &str, user: &str) -> Result<ExecutionContext> {
        let ctx = self.store().load(agent_id).await?;
        authorize(&ctx, user)?;
        if !self.is_executing(agent_id) {
            return Ok(ctx);
        }

        let cancel: &CancellationSignal = self.control.cancellation();
        cancel.request(agent_id);
        let stopped = poll_until(self.poll_interval, self.stop_timeout, || {
            let stopped = !self.is_executing(agent_id);
            async move { stopped }
        })
        .await;
        if !stopped {
            warn!(agent_id, "Agent did not stop within {:?}", self.stop_timeout);
            return Err(AgentError::StillExecuting(agent_id.to_string()));
        }
        Ok(self.store().load(agent_id).await?)
    }

    /// End an agent as `completed` whatever state it is in, recording why
    pub async fn cancel_agent(
        &self,
        agent_id: &str,
        execution_id: &str,
        reason: &str,
        user: &str,
    ) -> Result<ExecutionContext> {
        let ctx = self.store().load(agent_id).await?;
        authorize(&ctx, user)?;
        check_execution(&ctx, execution_id)?;

        let mut ctx = if self.is_executing(agent_id) {
            self.force_stop(agent_id, user).await?
        } else {
            ctx
        };

        let mut params = Map::new();
        params.insert("note".to_string(), json!(reason));
        ctx.append_call(FunctionCallResult::success(
            names::AGENT_COMPLETED,
            params,
            reason,
        ));
        ctx.set_state(RunningState::Completed);
        self.store().save(&ctx).await?;
        info!(agent_id, reason, "Cancelled agent");
        Ok(ctx)
    }

    /// Replace the active function classes
    pub async fn update_functions(
        &self,
        agent_id: &str,
        functions: Vec<String>,
    ) -> Result<ExecutionContext> {
        self.control
            .dispatcher()
            .registry()
            .validate_classes(&functions)?;

        // The loop persists the live context on its next save
        if let Some(live) = self.live(agent_id) {
            let mut ctx = ambient::lock(&live);
            ctx.functions = functions;
            ctx.touch();
            return Ok(ctx.clone());
        }

        let mut ctx = self.store().load(agent_id).await?;
        ctx.functions = functions;
        ctx.touch();
        self.store().save(&ctx).await?;
        Ok(ctx)
    }

    /// Run `work` as a non-interactive workflow with the new context ambient
    pub async fn run_workflow<F, Fut>(&self, params: AgentParams, work: F) -> Result<ExecutionContext>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let ctx = self
            .create(AgentParams {
                state: RunningState::Workflow,
                ..params
            })
            .await?;
        let agent_id = ctx.agent_id.clone();
        let shared = self.claim(ctx)?;

        let outcome = ambient::with_context(Arc::clone(&shared), work()).await;
        let snapshot = {
            let mut ctx = ambient::lock(&shared);
            match outcome {
                Ok(()) => ctx.set_state(RunningState::Completed),
                Err(e) => {
                    error!(agent_id = %agent_id, "Workflow failed: {}", e);
                    ctx.fail(e.to_string());
                }
            }
            ctx.clone()
        };
        let saved = self.store().save(&snapshot).await;
        self.release(&agent_id);
        saved?;
        Ok(snapshot)
    }

    /// The live context while executing, else the last saved one
    pub async fn details(&self, agent_id: &str) -> Result<ExecutionContext> {
        if let Some(live) = self.live(agent_id) {
            let ctx = ambient::lock(&live).clone();
            return Ok(ctx);
        }
        Ok(self.store().load(agent_id).await?)
    }

    pub async fn list(&self) -> Result<Vec<ExecutionContext>> {
        Ok(self.store().list().await?)
    }

    pub async fn list_running(&self) -> Result<Vec<ExecutionContext>> {
        Ok(self.store().list_running().await?)
    }

    pub async fn llm_calls(&self, agent_id: &str) -> Result<Vec<LlmCall>> {
        Ok(self.calls.list_for_agent(agent_id).await?)
    }
}

fn apply_input(ctx: &mut ExecutionContext, input: &str) {
    if !input.trim().is_empty() {
        ctx.input_prompt = input.to_string();
    }
}

fn authorize(ctx: &ExecutionContext, user: &str) -> Result<()> {
    if ctx.user != user {
        return Err(AgentError::Unauthorized {
            agent_id: ctx.agent_id.clone(),
            user: user.to_string(),
        });
    }
    Ok(())
}

/// An empty `execution_id` skips the check
fn check_execution(ctx: &ExecutionContext, execution_id: &str) -> Result<()> {
    if !execution_id.is_empty() && execution_id != ctx.execution_id {
        return Err(AgentError::ExecutionMismatch {
            given: execution_id.to_string(),
            current: ctx.execution_id.clone(),
        });
    }
    Ok(())
}
