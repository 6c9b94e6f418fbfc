//! agentry command implementations

use agentry_agent::{AgentRunner, AutoDecline, HitlGate, LaunchMode};
use agentry_api::ApiState;
use agentry_config::{self, Config};
use agentry_context::{ExecutionContext, RunningState};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::runtime::{build_runner, default_params, StdinConfirmation};
use crate::ResumeKind;

/// Options of `agentry run`
pub struct RunArgs {
    pub message: String,
    pub name: Option<String>,
    pub functions: Option<Vec<String>>,
    pub budget: Option<f64>,
    pub count: Option<u32>,
    pub hil_budget: Option<f64>,
}

/// Initialize configuration and data directories
pub async fn init_command() -> Result<()> {
    let config = agentry_config::init()
        .await
        .context("failed to initialize configuration")?;

    println!("◆ agentry initialized");
    println!("Config:    {}", agentry_config::config_path().display());
    println!("Workspace: {}", config.workspace_path().display());
    println!("Agents:    {}", config.agents_dir().display());
    if !config.has_api_key() {
        println!();
        println!("Set providers.openrouter.apiKey in the config to run agents.");
    }
    Ok(())
}

fn require_api_key(config: &Config) -> Result<()> {
    if !config.has_api_key() {
        bail!(
            "no API key configured; set providers.openrouter.apiKey in {}",
            agentry_config::config_path().display()
        );
    }
    Ok(())
}

/// Runner that asks on the terminal at every threshold
async fn interactive_runner(config: &Config) -> Result<AgentRunner> {
    let gate = HitlGate::blocking(Arc::new(StdinConfirmation));
    build_runner(config, gate, LaunchMode::Foreground).await
}

/// Runner that never waits for input
async fn passive_runner(config: &Config) -> Result<AgentRunner> {
    build_runner(config, HitlGate::suspending(), LaunchMode::Foreground).await
}

/// Start the REST server
pub async fn serve_command(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load().await?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if !config.has_api_key() {
        warn!("No API key configured; agents will fail at their first plan");
    }

    // Nobody is at a terminal, so blocking mode declines and parks the agent
    let gate = HitlGate::new(config.agent.hitl_mode, Arc::new(AutoDecline));
    let runner = build_runner(&config, gate, LaunchMode::Background).await?;
    let state = ApiState::new(runner, default_params(&config));

    let addr = config.server_addr();
    println!("◆ Serving on http://{}/agent/v1", addr);
    agentry_api::serve(state, &addr)
        .await
        .context("REST server stopped")?;
    Ok(())
}

/// Run a new agent until it stops
pub async fn run_command(args: RunArgs) -> Result<()> {
    let config = Config::load().await?;
    require_api_key(&config)?;

    let mut params = default_params(&config);
    params.user_prompt = args.message;
    if let Some(name) = args.name {
        params.name = name;
    }
    if let Some(functions) = args.functions {
        params.functions = functions;
    }
    if let Some(budget) = args.budget {
        params.budget = budget;
    }
    if let Some(count) = args.count {
        params.hil_count = count;
    }
    if let Some(hil_budget) = args.hil_budget {
        params.hil_budget = hil_budget;
    }
    tokio::fs::create_dir_all(&params.workspace).await?;

    let runner = interactive_runner(&config).await?;
    let ctx = runner.start(params).await?;
    info!(agent_id = %ctx.agent_id, state = %ctx.state, "Run finished");
    print_outcome(&ctx);
    Ok(())
}

/// List agents
pub async fn list_command(running: bool) -> Result<()> {
    let config = Config::load().await?;
    let runner = passive_runner(&config).await?;
    let agents = if running {
        runner.list_running().await?
    } else {
        runner.list().await?
    };

    if agents.is_empty() {
        println!("No agents");
        return Ok(());
    }
    for ctx in agents {
        println!(
            "  {}  {:<15} ${:<8.4} {}",
            ctx.agent_id,
            ctx.state.as_str(),
            ctx.cost,
            ctx.name
        );
    }
    Ok(())
}

/// Print one agent as JSON
pub async fn details_command(agent_id: &str) -> Result<()> {
    let config = Config::load().await?;
    let runner = passive_runner(&config).await?;
    let ctx = runner.details(agent_id).await?;
    println!("{}", serde_json::to_string_pretty(&ctx)?);
    Ok(())
}

/// Resume a stopped agent
pub async fn resume_command(
    agent_id: &str,
    kind: ResumeKind,
    message: &str,
    execution_id: &str,
) -> Result<()> {
    let config = Config::load().await?;
    require_api_key(&config)?;
    let runner = interactive_runner(&config).await?;

    let ctx = match kind {
        ResumeKind::Hil => runner.resume_hil(agent_id, execution_id, message).await?,
        ResumeKind::Error => runner.resume_error(agent_id, execution_id, message).await?,
        ResumeKind::Completed => {
            runner
                .resume_completed(agent_id, execution_id, message)
                .await?
        }
        ResumeKind::Feedback => {
            runner
                .provide_feedback(agent_id, execution_id, message)
                .await?
        }
    };
    print_outcome(&ctx);
    Ok(())
}

/// Mark an agent completed
pub async fn cancel_command(agent_id: &str, reason: &str, user: &str) -> Result<()> {
    let config = Config::load().await?;
    let runner = passive_runner(&config).await?;
    let ctx = runner.cancel_agent(agent_id, "", reason, user).await?;
    println!("✓ Agent {} cancelled ({})", ctx.agent_id, reason);
    Ok(())
}

/// Show status
pub async fn status_command() -> Result<()> {
    let config_path = agentry_config::config_path();
    let config = Config::load().await?;
    let workspace = config.workspace_path();

    println!("◆ agentry status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() { "[OK]" } else { "[Missing]" }
    );
    println!(
        "Workspace: {} {}",
        workspace.display(),
        if workspace.exists() { "[OK]" } else { "[Missing]" }
    );
    println!(
        "API Key:   {}",
        if config.has_api_key() { "[Set]" } else { "[Missing]" }
    );
    println!(
        "Models:    easy={} medium={} hard={} xhard={}",
        config.llm.easy, config.llm.medium, config.llm.hard, config.llm.xhard
    );
    println!(
        "HITL:      {:?}, every {} iterations or ${:.2}",
        config.agent.hitl_mode, config.agent.hil_count, config.agent.hil_budget
    );

    if config.agents_dir().exists() {
        let runner = passive_runner(&config).await?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for ctx in runner.list().await? {
            *counts.entry(ctx.state.to_string()).or_default() += 1;
        }
        let summary: Vec<String> = counts
            .iter()
            .map(|(state, count)| format!("{}={}", state, count))
            .collect();
        println!(
            "Agents:    {}",
            if summary.is_empty() {
                "none".to_string()
            } else {
                summary.join(" ")
            }
        );
    }

    println!("\n◆ Ready");
    Ok(())
}

fn print_outcome(ctx: &ExecutionContext) {
    println!();
    println!("◆ Agent {} is {}", ctx.agent_id, ctx.state);
    println!(
        "Cost: ${:.4} of ${:.2}, {} iterations",
        ctx.cost, ctx.budget, ctx.iterations
    );

    match ctx.state {
        RunningState::Completed => {
            if let Some(note) = ctx.last_call().and_then(|c| c.stdout.as_deref()) {
                println!("{}", note);
            }
        }
        RunningState::Error | RunningState::Timeout => {
            if let Some(error) = &ctx.error {
                println!("Error: {}", error);
            }
            println!(
                "Retry with: agentry resume {} --kind error -m \"<instructions>\"",
                ctx.agent_id
            );
        }
        RunningState::HitlFeedback => {
            if let Some(request) = ctx.pending_feedback().and_then(|c| c.stdout.as_deref()) {
                println!("Question: {}", request);
            }
            println!(
                "Answer with: agentry resume {} --kind feedback -m \"<answer>\"",
                ctx.agent_id
            );
        }
        RunningState::HitlThreshold => {
            println!("Approve with: agentry resume {} --kind hil", ctx.agent_id);
        }
        _ => {}
    }
}
