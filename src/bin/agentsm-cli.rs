//! Thin manual-operation / smoke-testing wrapper around the orchestrator
//! library: one subprocess invocation, one JSON object on stdout, no
//! interactive UI. A long-running caller (a server process, the
//! scheduler) should use the library directly — state and pending
//! approvals live in this process's memory only and do not survive past
//! the command returning.

use std::path::PathBuf;
use std::sync::Arc;

use agentsm::capability::CapabilityRegistry;
use agentsm::catalog::{McpToolCatalogClient, StaticToolCatalogClient, ToolCatalogClient};
use agentsm::config::RuntimeConfig;
use agentsm::llm::{AnthropicBackend, ModelBackendClient, OpenAiBackend};
use agentsm::mcp::McpClient;
use agentsm::orchestrator::Orchestrator;
use agentsm::types::ExecutionContext;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agentsm-cli", about = "Drive the agent workflow orchestrator for one operation and exit")]
struct Cli {
    /// Path to a RuntimeConfig TOML file. Falls back to defaults when absent.
    #[arg(long, env = "AGENTSM_CONFIG")]
    config: Option<PathBuf>,

    /// Which LLM backend to construct: "openai", "anthropic" or "mock".
    #[arg(long, env = "AGENTSM_MODEL_BACKEND", default_value = "openai")]
    model_backend: String,

    /// Command to spawn an MCP server for tool discovery/execution. When
    /// absent, the CLI falls back to an empty static tool catalog.
    #[arg(long, env = "AGENTSM_MCP_COMMAND")]
    mcp_command: Option<String>,

    #[arg(long, env = "AGENTSM_MCP_ARGS", value_delimiter = ',')]
    mcp_args: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new run and drive it until terminal or AWAITING_APPROVAL.
    Run {
        task: String,
        #[arg(long)]
        role: String,
        #[arg(long, default_value = "cli-user")]
        user: String,
    },
    /// Approve a pending approval and resume its run.
    Approve {
        approval_id: String,
        #[arg(long)]
        approver: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Reject a pending approval and resume its run.
    Reject {
        approval_id: String,
        #[arg(long)]
        approver: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Cancel a run; idempotent if the run is already terminal.
    Cancel {
        run_id: String,
        #[arg(long, default_value = "cancelled via CLI")]
        reason: String,
    },
    /// Print the current state of a run.
    Status { run_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime_config = match &cli.config {
        Some(path) => Arc::new(RuntimeConfig::from_file(path)?),
        None => Arc::new(RuntimeConfig::default()),
    };

    let catalog = build_catalog(&cli).await?;
    let model_backend = build_model_backend(&cli)?;
    let capability_registry = Arc::new(CapabilityRegistry::new(Arc::clone(&catalog)));
    let orchestrator = Orchestrator::new(capability_registry, model_backend, catalog, runtime_config);

    // Each CLI invocation is a fresh orchestrator: an approve/reject/cancel/
    // status command issued in a different process than the one that
    // created the run will legitimately see UnknownRun/UnknownApproval.
    // That's the tradeoff of a stateless one-shot binary; a persistent
    // deployment drives the orchestrator from one long-running process.
    let output = match cli.command {
        Command::Run { task, role, user } => {
            let state = orchestrator.run(ExecutionContext::new(task, role, user)).await;
            serde_json::to_value(&state)?
        }
        Command::Approve { approval_id, approver, reason } => {
            match orchestrator.approve(&approval_id, &approver, &reason).await {
                Ok(state) => serde_json::to_value(&state)?,
                Err(e) => error_json(&e),
            }
        }
        Command::Reject { approval_id, approver, reason } => {
            match orchestrator.reject(&approval_id, &approver, &reason).await {
                Ok(state) => serde_json::to_value(&state)?,
                Err(e) => error_json(&e),
            }
        }
        Command::Cancel { run_id, reason } => {
            match orchestrator.cancel(&run_id, &reason).await {
                Ok(state) => serde_json::to_value(&state)?,
                Err(e) => error_json(&e),
            }
        }
        Command::Status { run_id } => match orchestrator.status(&run_id) {
            Some(state) => serde_json::to_value(&state)?,
            None => error_json(&agentsm::error::OrchestratorError::UnknownRun(run_id)),
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn error_json(e: &agentsm::error::OrchestratorError) -> serde_json::Value {
    serde_json::json!({ "error": e.to_string() })
}

async fn build_catalog(cli: &Cli) -> anyhow::Result<Arc<dyn ToolCatalogClient>> {
    match &cli.mcp_command {
        Some(command) => {
            let client = McpClient::new(command, &cli.mcp_args).await?;
            Ok(Arc::new(McpToolCatalogClient::new(client, command.clone())))
        }
        None => Ok(Arc::new(StaticToolCatalogClient::new())),
    }
}

fn build_model_backend(cli: &Cli) -> anyhow::Result<Arc<dyn ModelBackendClient>> {
    match cli.model_backend.as_str() {
        "openai" => Ok(Arc::new(OpenAiBackend::new())),
        "anthropic" => Ok(Arc::new(AnthropicBackend::from_env().map_err(anyhow::Error::msg)?)),
        "mock" => Ok(Arc::new(agentsm::llm::MockModelBackend::new(vec![]))),
        other => anyhow::bail!("unknown model backend '{other}', expected openai|anthropic|mock"),
    }
}
