// src/main.rs
//! Agent Execution Engine
//!
//! Demo binary: runs a YAML pipeline for one tenant against the built-in
//! agents and prints the results as JSON, or prints the effective
//! configuration.

use agent_engine::agents::{register_builtins, InMemoryAgentRegistry};
use agent_engine::events::{ChannelTransport, EventNotifier};
use agent_engine::observability;
use agent_engine::{BuildInfo, EngineBuilder, EngineConfig, PipelineDefinition, TenantContext};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "agent-engine", version, about = "Per-tenant isolated agent execution engine")]
struct Cli {
    /// Configuration file (overrides AGENT_ENGINE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a YAML pipeline for one tenant
    Run {
        /// Pipeline definition file
        pipeline: PathBuf,

        /// Tenant user id
        #[arg(long)]
        user: String,

        /// Conversation thread id
        #[arg(long, default_value = "cli-thread")]
        thread: String,

        /// Run id (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Print every event delivered to the tenant
        #[arg(long)]
        events: bool,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => EngineConfig::load().context("loading configuration")?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    observability::init(&config.observability)?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run {
            pipeline,
            user,
            thread,
            run_id,
            events,
        } => run_pipeline(config, pipeline, user, thread, run_id, events).await,
    }
}

async fn run_pipeline(
    config: EngineConfig,
    pipeline: PathBuf,
    user: String,
    thread: String,
    run_id: Option<String>,
    print_events: bool,
) -> Result<()> {
    let build = BuildInfo::current();
    info!("Starting Agent Engine v{} ({})", build.version, build.git_hash);

    let definition = PipelineDefinition::from_file(&pipeline)
        .with_context(|| format!("reading pipeline {}", pipeline.display()))?;

    let transport = Arc::new(ChannelTransport::new());
    let mut receiver = transport.connect(&user);
    let notifier = Arc::new(EventNotifier::new(transport.clone()));

    let registry = Arc::new(InMemoryAgentRegistry::new());
    register_builtins(&registry, Arc::clone(&notifier));

    let engine = EngineBuilder::new()
        .config(config)
        .registry(registry)
        .notifier(notifier)
        .build()?;

    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            if print_events {
                match serde_json::to_string(&event) {
                    Ok(line) => eprintln!("{}", line),
                    Err(e) => debug!(error = %e, "Could not serialise event"),
                }
            }
        }
    });

    let run_id = run_id.unwrap_or_else(|| format!("run_{}", ulid::Ulid::new()));
    let request_id = format!("req_{}", ulid::Ulid::new());
    let tenant = TenantContext::new(user.as_str(), thread, run_id, request_id);
    let base = engine.context(&tenant, definition.name.as_str());

    info!(pipeline = %definition.name, steps = definition.steps.len(), "Running pipeline");
    let results = engine
        .execute_pipeline_with_state(
            &definition.into_steps(),
            &base,
            &tenant,
            definition.initial_state.clone(),
        )
        .await?;

    let stats = engine.get_execution_stats();
    engine.shutdown().await;
    printer.abort();

    let report = json!({
        "pipeline": definition.name,
        "user_id": user,
        "run_id": tenant.run_id,
        "results": results,
        "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
