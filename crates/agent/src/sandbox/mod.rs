//! Sandboxed script execution
//!
//! Model-written scripts run in an embedded `rhai` engine that can reach
//! the host only through the bridged agent functions and the allow-listed
//! modules. Evaluation happens on a blocking thread; bridged calls re-enter
//! the async runtime under the agent's context.
//!
//! A script that fails to parse gets exactly one rewrite from the hard
//! model tier. Any other failure is returned to the caller.

pub mod bridge;
pub mod extract;
pub mod imports;

pub use bridge::{Bridge, MEMORY_PLACEHOLDER};
pub use extract::extract_script;

use agentry_context::{ambient, SharedContext, Tier};
use agentry_provider::GenerateRequest;
use rhai::{Engine, ParseError};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::cancel::CancellationSignal;
use crate::functions::Dispatcher;
use crate::llm::ModelClient;
use crate::prompt::PromptBuilder;
use crate::{AgentError, Result, SandboxError};

/// Engine resource limits
#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_string_size: 1 << 20,
            max_array_size: 10_000,
        }
    }
}

/// Result of a script that ran to the end
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutcome {
    /// Lines printed by the script
    pub output: Vec<String>,
    /// The script that actually ran
    pub script: String,
    /// Whether the script was rewritten after a syntax error
    pub repaired: bool,
}

pub struct ScriptRunner {
    dispatcher: Arc<Dispatcher>,
    models: Arc<ModelClient>,
    prompts: PromptBuilder,
    cancel: CancellationSignal,
    limits: SandboxLimits,
}

impl ScriptRunner {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        models: Arc<ModelClient>,
        cancel: CancellationSignal,
    ) -> Self {
        Self {
            dispatcher,
            models,
            prompts: PromptBuilder::new(),
            cancel,
            limits: SandboxLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Run `script`, repairing it once if it does not parse
    pub async fn run(&self, ctx: &SharedContext, script: &str) -> Result<ScriptOutcome> {
        match self.execute(ctx, script).await {
            Err(err) if err.is_syntax() => {
                warn!("Script failed to parse, requesting repair: {}", err);
                let fixed = self.repair(ctx, script, &err).await?;
                let mut outcome = self.execute(ctx, &fixed).await?;
                outcome.repaired = true;
                Ok(outcome)
            }
            other => Ok(other?),
        }
    }

    /// One attempt, no repair
    pub async fn execute(
        &self,
        ctx: &SharedContext,
        script: &str,
    ) -> std::result::Result<ScriptOutcome, SandboxError> {
        let bridge = Arc::new(Bridge::new(
            Arc::clone(&self.dispatcher),
            Arc::clone(ctx),
            self.cancel.clone(),
            Handle::current(),
        ));
        let limits = self.limits;
        let source = script.to_string();

        tokio::task::spawn_blocking(move || evaluate(&bridge, &source, limits))
            .await
            .map_err(|e| SandboxError::Runtime(format!("script task failed: {}", e)))?
    }

    async fn repair(
        &self,
        ctx: &SharedContext,
        script: &str,
        error: &SandboxError,
    ) -> Result<String> {
        let request = GenerateRequest::new(self.prompts.repair_prompt(script, &error.to_string()));
        let generation = ambient::with_context(
            Arc::clone(ctx),
            self.models.generate(Tier::Hard, "script repair", request),
        )
        .await?;

        let fixed = extract_script(&generation.text)
            .unwrap_or_else(|| generation.text.trim().to_string());
        if fixed.is_empty() {
            return Err(AgentError::Sandbox(SandboxError::Repair(
                "model returned an empty script".to_string(),
            )));
        }
        info!("Received repaired script ({} chars)", fixed.len());
        Ok(fixed)
    }
}

fn build_engine(script: &str, limits: SandboxLimits, output: Arc<Mutex<Vec<String>>>) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.disable_symbol("eval");
    engine.set_module_resolver(imports::resolver_for(script));

    engine.on_print(move |line| {
        debug!(target: "agentry::script", "{}", line);
        output
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
    });
    engine.on_debug(|text, _source, pos| {
        debug!(target: "agentry::script", "{:?}: {}", pos, text);
    });
    engine
}

fn syntax_error(err: &ParseError) -> SandboxError {
    SandboxError::Syntax {
        message: err.0.to_string(),
        line: err.1.line().unwrap_or(0),
        column: err.1.position().unwrap_or(0),
    }
}

fn evaluate(
    bridge: &Arc<Bridge>,
    script: &str,
    limits: SandboxLimits,
) -> std::result::Result<ScriptOutcome, SandboxError> {
    let output = Arc::new(Mutex::new(Vec::new()));
    let mut engine = build_engine(script, limits, Arc::clone(&output));
    bridge.install(&mut engine);

    let ast = engine.compile(script).map_err(|e| syntax_error(&e))?;
    engine
        .run_ast(&ast)
        .map_err(|e| SandboxError::Runtime(e.to_string()))?;

    let output = std::mem::take(&mut *output.lock().unwrap_or_else(|e| e.into_inner()));
    Ok(ScriptOutcome {
        output,
        script: script.to_string(),
        repaired: false,
    })
}
