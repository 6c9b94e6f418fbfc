//! Control loop - the agent state machine
//!
//! One iteration: cancellation and timeout checkpoint, HITL gate, plan from
//! the hard tier, run the plan's script, then decide from the calls the
//! script made whether to stop or go round again. The context is saved
//! after every transition.

use agentry_context::{ambient, names, ExecutionContext, RunningState, SharedContext, Tier};
use agentry_provider::GenerateRequest;
use agentry_store::AgentStateStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::cancel::CancellationSignal;
use crate::functions::Dispatcher;
use crate::hitl::{GateOutcome, HitlGate};
use crate::llm::ModelClient;
use crate::prompt::PromptBuilder;
use crate::sandbox::{extract_script, SandboxLimits, ScriptRunner};
use crate::{AgentError, Result};

/// How an iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Stop(RunningState),
}

/// Drives one agent from `agent` to a stopping state
pub struct ControlLoop {
    dispatcher: Arc<Dispatcher>,
    models: Arc<ModelClient>,
    runner: ScriptRunner,
    store: Arc<dyn AgentStateStore>,
    hitl: HitlGate,
    cancel: CancellationSignal,
    prompts: PromptBuilder,
    max_run: Option<Duration>,
}

impl ControlLoop {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        models: Arc<ModelClient>,
        store: Arc<dyn AgentStateStore>,
        hitl: HitlGate,
        cancel: CancellationSignal,
    ) -> Self {
        let runner = ScriptRunner::new(Arc::clone(&dispatcher), Arc::clone(&models), cancel.clone());
        Self {
            dispatcher,
            models,
            runner,
            store,
            hitl,
            cancel,
            prompts: PromptBuilder::new(),
            max_run: None,
        }
    }

    /// Wall-clock limit per execution
    pub fn with_max_run(mut self, max_run: Option<Duration>) -> Self {
        self.max_run = max_run;
        self
    }

    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.runner = self.runner.with_limits(limits);
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn models(&self) -> &Arc<ModelClient> {
        &self.models
    }

    pub fn store(&self) -> &Arc<dyn AgentStateStore> {
        &self.store
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancel
    }

    /// Run `ctx` and return it in its final state
    pub async fn run(&self, ctx: ExecutionContext) -> Result<ExecutionContext> {
        let shared = ambient::shared(ctx);
        self.run_shared(&shared).await?;
        let ctx = ambient::lock(&shared).clone();
        Ok(ctx)
    }

    /// Run until the agent stops.
    ///
    /// A context that is not in `agent` or `functions` is left untouched.
    /// Failures inside an iteration end the run in `error`; only a failure
    /// to persist is returned.
    pub async fn run_shared(&self, shared: &SharedContext) -> Result<RunningState> {
        let state = ambient::lock(shared).state;
        if !matches!(state, RunningState::Agent | RunningState::Functions) {
            debug!("Not running agent in state {}", state);
            return Ok(state);
        }
        ambient::with_context(Arc::clone(shared), self.drive(shared)).await
    }

    async fn drive(&self, shared: &SharedContext) -> Result<RunningState> {
        loop {
            match self.iterate(shared).await {
                Ok(Step::Continue) => self.save(shared).await?,
                Ok(Step::Stop(state)) => {
                    self.save(shared).await?;
                    return Ok(state);
                }
                Err(e) => {
                    let agent_id = {
                        let mut ctx = ambient::lock(shared);
                        ctx.fail(e.to_string());
                        ctx.agent_id.clone()
                    };
                    error!(agent_id = %agent_id, "Agent run failed: {}", e);
                    self.save(shared).await?;
                    return Ok(RunningState::Error);
                }
            }
        }
    }

    async fn iterate(&self, shared: &SharedContext) -> Result<Step> {
        let (agent_id, iteration, started) = {
            let ctx = ambient::lock(shared);
            (ctx.agent_id.clone(), ctx.iterations, ctx.execution_started_at)
        };

        if self.cancel.take(&agent_id) {
            return Err(AgentError::ForceStopped);
        }
        if let Some(max_run) = self.max_run {
            let elapsed = (Utc::now() - started).to_std().unwrap_or_default();
            if elapsed >= max_run {
                info!(agent_id = %agent_id, "Run exceeded {:?}, timing out", max_run);
                ambient::lock(shared).set_state(RunningState::Timeout);
                return Ok(Step::Stop(RunningState::Timeout));
            }
        }
        if self.hitl.check(shared).await == GateOutcome::Halt {
            return Ok(Step::Stop(RunningState::HitlThreshold));
        }

        debug!(agent_id = %agent_id, iteration, "Agent iteration");
        let snapshot = ambient::lock(shared).clone();
        let schemas = self.dispatcher.registry().schemas_for(&snapshot.functions);
        let system_prompt = self.prompts.build_system_prompt(&snapshot, &schemas).await;
        let request =
            GenerateRequest::new(self.prompts.build_prompt(&snapshot)).with_system(system_prompt);

        let plan = self.models.generate(Tier::Hard, "plan", request).await?;
        let script = extract_script(&plan.text).ok_or(AgentError::NoScript)?;

        let first_new = {
            let mut ctx = ambient::lock(shared);
            ctx.set_state(RunningState::Functions);
            ctx.function_call_history.len()
        };
        self.save(shared).await?;

        let outcome = match self.runner.run(shared, &script).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // A stop request surfaces in the script as a failed call
                if self.cancel.take(&agent_id) {
                    return Err(AgentError::ForceStopped);
                }
                return Err(e);
            }
        };

        let mut ctx = ambient::lock(shared);
        let last = ctx.function_call_history[first_new..]
            .last()
            .map(|call| call.function_name.clone());
        match last.as_deref() {
            Some(names::AGENT_COMPLETED) => {
                info!(agent_id = %agent_id, iteration, "Agent completed");
                ctx.set_state(RunningState::Completed);
                Ok(Step::Stop(RunningState::Completed))
            }
            Some(names::AGENT_REQUEST_FEEDBACK) => {
                info!(agent_id = %agent_id, "Agent requested feedback");
                ctx.set_state(RunningState::HitlFeedback);
                Ok(Step::Stop(RunningState::HitlFeedback))
            }
            _ => {
                ctx.set_state(RunningState::Agent);
                ctx.iterations += 1;
                ctx.count_since_hil += 1;
                ctx.input_prompt = self.prompts.next_input(&outcome.output);
                Ok(Step::Continue)
            }
        }
    }

    async fn save(&self, shared: &SharedContext) -> Result<()> {
        let snapshot = ambient::lock(shared).clone();
        self.store.save(&snapshot).await?;
        Ok(())
    }
}
