//! `flowrun` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`: execute a workflow graph once and print the run result.
//! - `validate`: check a graph and print its execution order.
//! - `test-node`: execute a single node against mocked upstream state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use adapters::CredentialBundle;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use engine::{build_plan, EngineConfig, Graph, NodeTestInput, WorkflowExecutor};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowrun", about = "Execute visual automation workflows", version)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Command,
}

/// Engine tuning; each flag falls back to an environment variable.
#[derive(Args)]
struct EngineArgs {
    /// JSON file with an `EngineConfig`; flags below override it.
    #[arg(long, global = true, env = "FLOWRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Wall-clock budget for a whole run, in seconds.
    #[arg(long, global = true, env = "FLOWRUN_RUN_TIMEOUT_SECS")]
    run_timeout_secs: Option<u64>,

    /// Per-call HTTP timeout for provider adapters, in seconds.
    #[arg(long, global = true, env = "FLOWRUN_ADAPTER_TIMEOUT_SECS")]
    adapter_timeout_secs: Option<u64>,

    /// Keep the JSON type of fields that are exactly one placeholder.
    #[arg(long, global = true, env = "FLOWRUN_PRESERVE_TYPES")]
    preserve_types: bool,

    #[arg(long, global = true, env = "FLOWRUN_EMAIL_FROM")]
    email_from: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workflow graph once.
    Run {
        /// Path to the graph JSON file (`{ nodes, edges }`).
        #[arg(long)]
        graph: PathBuf,
        /// Trigger payload: inline JSON or `@path/to/file.json`.
        #[arg(long, default_value = "{}")]
        input: String,
        /// JSON object of credential bundles keyed by provider.
        #[arg(long, env = "FLOWRUN_CREDENTIALS")]
        credentials: Option<PathBuf>,
        #[arg(long, default_value = "cli")]
        workflow_id: String,
    },
    /// Validate a graph and print its execution order.
    Validate {
        #[arg(long)]
        graph: PathBuf,
    },
    /// Execute one node of a graph in isolation.
    TestNode {
        #[arg(long)]
        graph: PathBuf,
        /// Id of the node to execute.
        #[arg(long)]
        node: String,
        /// Mock trigger payload: inline JSON or `@file`.
        #[arg(long, default_value = "{}")]
        input: String,
        /// Mock previous-node output: inline JSON or `@file`.
        #[arg(long)]
        previous: Option<String>,
        #[arg(long, env = "FLOWRUN_CREDENTIALS")]
        credentials: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Run {
            graph,
            input,
            credentials,
            workflow_id,
        } => {
            let graph = load_graph(&graph)?;
            let trigger_input = parse_json_arg(&input)?;
            let credentials = load_credentials(credentials.as_deref())?;
            let executor = build_executor(&cli.engine)?;

            let result = executor
                .run(&workflow_id, &graph, trigger_input, &credentials)
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.success)
        }
        Command::Validate { graph } => {
            let graph = load_graph(&graph)?;
            match build_plan(&graph) {
                Ok(plan) => {
                    println!("Workflow is valid. Execution order: {:?}", plan.order);
                    if !plan.unreachable.is_empty() {
                        println!("Unreachable nodes (never executed): {:?}", plan.unreachable);
                    }
                    Ok(true)
                }
                Err(err) => {
                    eprintln!("Validation failed: {err}");
                    Ok(false)
                }
            }
        }
        Command::TestNode {
            graph,
            node,
            input,
            previous,
            credentials,
        } => {
            let graph = load_graph(&graph)?;
            let Some(node) = graph.node(&node) else {
                bail!("graph has no node '{node}'");
            };
            let test_input = NodeTestInput {
                trigger_input: parse_json_arg(&input)?,
                previous_output: previous.as_deref().map(parse_json_arg).transpose()?,
                ..NodeTestInput::default()
            };
            let credentials = load_credentials(credentials.as_deref())?;
            let executor = build_executor(&cli.engine)?;

            let outcome = executor.test_node(node, test_input, &credentials).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(outcome.result.success)
        }
    }
}

fn build_executor(args: &EngineArgs) -> Result<WorkflowExecutor> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&text).context("invalid engine config")?
        }
        None => EngineConfig::default(),
    };
    if let Some(secs) = args.run_timeout_secs {
        config.run_timeout_secs = secs;
    }
    if let Some(secs) = args.adapter_timeout_secs {
        config.adapters.timeout_secs = secs;
    }
    if args.preserve_types {
        config.preserve_placeholder_types = true;
    }
    if let Some(from) = &args.email_from {
        config.adapters.email_from = Some(from.clone());
    }
    info!(run_timeout_secs = config.run_timeout_secs, "engine configured");
    WorkflowExecutor::with_builtin_adapters(config).context("failed to build adapters")
}

fn load_graph(path: &Path) -> Result<Graph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read graph {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid graph JSON in {}", path.display()))
}

fn load_credentials(path: Option<&Path>) -> Result<HashMap<String, CredentialBundle>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read credentials {}", path.display()))?;
    serde_json::from_str(&text).context("invalid credentials JSON")
}

/// Inline JSON, or `@path` to read it from a file.
fn parse_json_arg(arg: &str) -> Result<Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?,
        None => arg.to_owned(),
    };
    serde_json::from_str(&text).context("argument is not valid JSON")
}
