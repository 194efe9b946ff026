// SPDX-License-Identifier: Apache-2.0
//! Composition-entrypoint demonstration CLI.
//!
//! Wires the activities in `activity-orchestrator-demos` into named
//! workflows and dispatches them through a `Runner` backed by an
//! `InMemoryRunStore`. Each invocation of this binary starts a fresh,
//! in-process store — `history` and `logs` only see runs dispatched earlier
//! in the *same* process, which in practice means within one `serve`
//! session. A deployment that needs history to survive process restarts
//! backs `RunStore` with its own persistent adapter; that adapter, like the
//! HTTP/UI surface a real backup-automation deployment would put in front of
//! it, is outside this crate's scope.

use std::sync::Arc;
use std::time::Duration;

use activity_orchestrator_core::{
    CompositionRoot, ExecutionContext, InMemoryRunStore, LogCollector, Orchestrator, Runner,
    StatusCollection, Workflow, WorkflowRegistry,
};
use activity_orchestrator_demos::{ShellCommand, Sleep, Summarize};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(version, about = "Activity orchestrator composition-entrypoint demo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named demo workflow once and print the resulting Run record.
    Run {
        #[arg(default_value = "demo-chain")]
        workflow: String,
    },
    /// Print the run history for a workflow name (empty unless this process has already run it).
    History { workflow: String },
    /// Print the captured logs for a run ID (empty unless this process produced that run).
    Logs { run_id: String },
    /// Register the demo workflows against one or more cron triggers and run until Ctrl+C.
    Serve {
        /// `workflows:cron_expr(;workflows:cron_expr)*`, e.g. `demo-chain:0 */5 * * * *`
        #[arg(long)]
        cron: String,
    },
}

fn build_registry(log_sink: Arc<LogCollector>) -> (WorkflowRegistry, StatusCollection) {
    let status = StatusCollection::new();
    let mut orchestrator = Orchestrator::new()
        .with_log_sink(log_sink)
        .with_status(status.clone());
    orchestrator
        .add_activity(Sleep::new("warmup", Duration::from_millis(50)))
        .expect("Sleep added once");
    orchestrator
        .add_activity(ShellCommand::new("echo", vec!["hello from the CLI demo".to_string()]))
        .expect("ShellCommand added once");
    orchestrator
        .add_activity(Summarize::new(status.clone()))
        .expect("Summarize added once");

    let mut registry = WorkflowRegistry::new();
    registry.register("demo-chain", Arc::new(orchestrator) as Arc<dyn Workflow>);
    (registry, status)
}

#[tokio::main]
async fn main() -> Result<()> {
    let collector = LogCollector::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(collector.clone())
        .init();
    let collector = Arc::new(collector);

    let cli = Cli::parse();

    let (registry, status) = build_registry(collector.clone());
    let store = Arc::new(InMemoryRunStore::new(Some(200)));
    let runner = Arc::new(Runner::new(store).with_log_source(collector));

    match cli.command {
        Commands::Run { workflow } => {
            let target = registry
                .get(&workflow)
                .with_context(|| format!("no workflow registered under '{workflow}'"))?;
            let ctx = ExecutionContext::new(CancellationToken::new());
            let run = runner.run(workflow, target.as_ref(), ctx).await;
            print_run(&run);
            for (identity, message) in status.all() {
                println!("status[{}] = {message}", identity.short_string());
            }
        }
        Commands::History { workflow } => {
            for run in runner.history(&workflow).await {
                print_run(&run);
            }
        }
        Commands::Logs { run_id } => {
            match runner.logs(&run_id).await {
                Some(logs) => {
                    for line in logs {
                        println!(
                            "[{}] {} {}",
                            line.timestamp.to_rfc3339(),
                            line.activity.map(|a| a.short_string()).unwrap_or_else(|| "-".to_string()),
                            line.message
                        );
                    }
                }
                None => println!("no run found with id '{run_id}'"),
            }
        }
        Commands::Serve { cron } => {
            let mut root = CompositionRoot::new(registry, runner);
            root.add_cron_trigger(&cron)
                .with_context(|| format!("invalid cron trigger spec '{cron}'"))?;

            let cancellation = CancellationToken::new();
            let shutdown = cancellation.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
            });

            tracing::info!(%cron, "starting cron scheduler, press Ctrl+C to stop");
            root.run_forever(cancellation).await;
        }
    }

    Ok(())
}

fn print_run(run: &activity_orchestrator_core::Run) {
    println!("run {} ({}) finished as {:?}", run.id, run.workflow, run.outcome);
    for execution in &run.executions {
        println!(
            "  {:<40} {:?} {}",
            execution.identity.short_string(),
            execution.state,
            execution.error.as_deref().unwrap_or("")
        );
    }
}
