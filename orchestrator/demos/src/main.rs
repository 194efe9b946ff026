// SPDX-License-Identifier: Apache-2.0
//! Wires the demo activities into a linear chain (`Sleep -> ShellCommand ->
//! Summarize`) and runs it once through a `Runner`, printing the recorded run.

use std::sync::Arc;
use std::time::Duration;

use activity_orchestrator_core::{
    ExecutionContext, InMemoryRunStore, Orchestrator, Runner, StatusCollection,
};
use activity_orchestrator_demos::{ShellCommand, Sleep, Summarize};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let status = StatusCollection::new();

    let mut orchestrator = Orchestrator::new().with_status(status.clone());
    orchestrator
        .add_activity(Sleep::new("warmup", Duration::from_millis(50)))
        .expect("Sleep added once");
    orchestrator
        .add_activity(ShellCommand::new("echo", vec!["hello from the demo chain".to_string()]))
        .expect("ShellCommand added once");
    orchestrator
        .add_activity(Summarize::new(status.clone()))
        .expect("Summarize added once");

    let store = Arc::new(InMemoryRunStore::new(Some(50)));
    let runner = Runner::new(store);

    let ctx = ExecutionContext::new(CancellationToken::new());
    let run = runner.run("demo-chain", &orchestrator, ctx).await;

    println!("run {} finished as {:?}", run.id, run.outcome);
    for execution in &run.executions {
        println!(
            "  {:<40} {:?} {}",
            execution.identity.short_string(),
            execution.state,
            execution.error.as_deref().unwrap_or("")
        );
    }
    for (identity, message) in status.all() {
        println!("status[{}] = {message}", identity.short_string());
    }
}
