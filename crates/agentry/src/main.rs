//! agentry - autonomous agents that plan in sandboxed scripts

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;
mod runtime;

use commands::{
    cancel_command, details_command, init_command, list_command, resume_command, run_command,
    serve_command, status_command, RunArgs,
};

/// agentry - run and supervise autonomous agents
#[derive(Parser)]
#[command(name = "agentry")]
#[command(about = "◆ Autonomous agents that plan in sandboxed scripts")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and data directories
    Init,
    /// Start the REST server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a new agent in the foreground
    Run {
        /// What the agent should do
        #[arg(short, long)]
        message: String,
        #[arg(short, long)]
        name: Option<String>,
        /// Function classes, comma separated
        #[arg(short, long, value_delimiter = ',')]
        functions: Option<Vec<String>>,
        /// Spending limit in USD
        #[arg(short, long)]
        budget: Option<f64>,
        /// Iterations between confirmations
        #[arg(short, long)]
        count: Option<u32>,
        /// Budget added per approval
        #[arg(long)]
        hil_budget: Option<f64>,
    },
    /// List agents
    List {
        /// Only agents that have not finished
        #[arg(short, long)]
        running: bool,
    },
    /// Show one agent as JSON
    Details { agent_id: String },
    /// Resume a stopped agent
    Resume {
        agent_id: String,
        #[arg(short, long, value_enum)]
        kind: ResumeKind,
        /// Feedback or new instructions
        #[arg(short, long, default_value = "")]
        message: String,
        /// Execution the caller last saw
        #[arg(short, long, default_value = "")]
        execution: String,
    },
    /// Mark an agent completed
    Cancel {
        agent_id: String,
        #[arg(short, long, default_value = "cancelled from the command line")]
        reason: String,
        #[arg(short, long, default_value = "default")]
        user: String,
    },
    /// Show system status
    Status,
}

/// Which stop an agent is resumed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResumeKind {
    /// Approve a budget or iteration threshold
    Hil,
    /// Retry after an error or timeout
    Error,
    /// Continue a completed agent
    Completed,
    /// Answer a feedback request
    Feedback,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Serve { host, port } => serve_command(host, port).await,
        Commands::Run {
            message,
            name,
            functions,
            budget,
            count,
            hil_budget,
        } => {
            run_command(RunArgs {
                message,
                name,
                functions,
                budget,
                count,
                hil_budget,
            })
            .await
        }
        Commands::List { running } => list_command(running).await,
        Commands::Details { agent_id } => details_command(&agent_id).await,
        Commands::Resume {
            agent_id,
            kind,
            message,
            execution,
        } => resume_command(&agent_id, kind, &message, &execution).await,
        Commands::Cancel {
            agent_id,
            reason,
            user,
        } => cancel_command(&agent_id, &reason, &user).await,
        Commands::Status => status_command().await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
