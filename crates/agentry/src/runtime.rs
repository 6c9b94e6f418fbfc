//! Wiring the engine from configuration

use agentry_agent::{
    AgentRunner, CancellationSignal, Confirmation, ControlLoop, Dispatcher, FunctionCache,
    FunctionRegistry, HitlGate, HitlRequest, LaunchMode, ModelClient, RetryPolicy,
};
use agentry_config::Config;
use agentry_context::{AgentParams, ExecutionContext, LlmTiers};
use agentry_provider::{Llm, LlmFactory, LlmRegistry, OpenRouterLlm, Pricing};
use agentry_store::{FileAgentStore, FileLlmCallStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Models resolved on first use from the configured provider
fn llm_registry(config: &Config) -> LlmRegistry {
    let api_key = config.api_key().unwrap_or_default();
    let api_base = config.api_base();
    let provider = config.active_provider();
    let pricing = Pricing::new(provider.input_cost_per_mtok, provider.output_cost_per_mtok);
    let (max_tokens, temperature) = (config.llm.max_tokens, config.llm.temperature);

    let factory: LlmFactory = Arc::new(move |model: &str| {
        debug!(model, "creating model client");
        Arc::new(
            OpenRouterLlm::new(api_key.clone(), api_base.clone(), model)
                .with_pricing(pricing)
                .with_defaults(max_tokens, temperature),
        ) as Arc<dyn Llm>
    });
    LlmRegistry::with_factory(factory)
}

/// A runner over the file stores named in `config`
pub async fn build_runner(config: &Config, gate: HitlGate, mode: LaunchMode) -> Result<AgentRunner> {
    let registry = FunctionRegistry::builtin().context("invalid function metadata")?;
    let retry = RetryPolicy::new(
        config.cache.retries,
        Duration::from_millis(config.cache.retry_backoff_ms),
    );
    let cache = FunctionCache::with_persistence(config.cache_dir(), retry);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), Arc::new(cache)));

    let calls = Arc::new(
        FileLlmCallStore::new(config.llm_calls_dir())
            .await
            .context("failed to open LLM call store")?,
    );
    let models = Arc::new(ModelClient::new(Arc::new(llm_registry(config)), calls.clone()));
    let store = Arc::new(
        FileAgentStore::new(config.agents_dir())
            .await
            .context("failed to open agent store")?,
    );

    let control = ControlLoop::new(dispatcher, models, store, gate, CancellationSignal::new())
        .with_max_run(config.agent.max_run_seconds.map(Duration::from_secs));
    Ok(AgentRunner::new(Arc::new(control), calls).with_mode(mode))
}

/// Settings for a new agent before command line overrides
pub fn default_params(config: &Config) -> AgentParams {
    AgentParams {
        budget: config.agent.budget,
        hil_budget: config.agent.hil_budget,
        hil_count: config.agent.hil_count,
        llms: LlmTiers {
            easy: config.llm.easy.clone(),
            medium: config.llm.medium.clone(),
            hard: config.llm.hard.clone(),
            xhard: config.llm.xhard.clone(),
        },
        functions: config.agent.functions.clone(),
        workspace: config.workspace_path(),
        ..Default::default()
    }
}

/// Asks on the terminal before crossing a threshold
pub struct StdinConfirmation;

#[async_trait]
impl Confirmation for StdinConfirmation {
    async fn confirm(&self, ctx: &ExecutionContext, request: &HitlRequest) -> bool {
        println!();
        println!("◆ {} ({})", request, ctx.name);
        print!("Continue? [y/N] ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_follow_config() {
        let mut config = Config::default();
        config.agent.budget = 4.5;
        config.agent.functions = vec!["Agent".to_string()];
        config.llm.hard = "vendor/big".to_string();

        let params = default_params(&config);
        assert_eq!(params.budget, 4.5);
        assert_eq!(params.functions, vec!["Agent"]);
        assert_eq!(params.llms.hard, "vendor/big");
        assert_eq!(params.user, "default");
    }

    #[test]
    fn test_registry_creates_models_on_demand() {
        let registry = llm_registry(&Config::default());
        let llm = registry.resolve("vendor/model").unwrap();
        assert!(llm.model_id().contains("vendor/model"));
        assert_eq!(registry.ids(), vec!["vendor/model"]);
    }
}
