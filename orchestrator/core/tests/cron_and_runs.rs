// SPDX-License-Identifier: Apache-2.0
//! Drives the cron scheduler against a paused clock, and exercises the
//! runner/run-store/log-collector stack together the way a composition root
//! wires them in practice.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use activity_orchestrator_core::{
    Activity, ActivityError, ActivityIdentity, CronScheduler, ExecutionContext, InMemoryRunStore,
    LogCollector, Orchestrator, RunOutcome, Runner, StatusCollection, Workflow, WorkflowRegistry,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn cron_scheduler_dispatches_on_schedule_and_skips_overlapping_fires() {
    let known: HashSet<String> = ["nightly".to_string()].into_iter().collect();
    let mut scheduler = CronScheduler::new();
    // Fires every second; the dispatcher sleeps 3s, so the scheduler must
    // skip every fire that lands while the previous dispatch is still busy.
    scheduler.add_trigger("nightly:* * * * * *", &known).unwrap();

    let dispatch_count = Arc::new(AtomicUsize::new(0));
    let count = dispatch_count.clone();
    let dispatch = Arc::new(move |name: String| -> BoxFuture<'static, ()> {
        assert_eq!(name, "nightly");
        let count = count.clone();
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3)).await;
        })
    });

    let cancellation = CancellationToken::new();
    let run_cancellation = cancellation.clone();
    let runner = tokio::spawn(async move {
        scheduler.run(dispatch, run_cancellation).await;
    });

    tokio::time::advance(Duration::from_millis(1_200)).await;
    tokio::time::advance(Duration::from_secs(5)).await;
    cancellation.cancel();
    runner.await.unwrap();

    // At least the first fire must have gone through; overlap prevention
    // means far fewer than the ~6 ticks elapsed actually dispatched.
    let dispatched = dispatch_count.load(Ordering::SeqCst);
    assert!(dispatched >= 1, "expected at least one dispatch, got {dispatched}");
    assert!(dispatched < 6, "overlap prevention should have skipped most fires, got {dispatched}");
}

struct Counting {
    calls: Arc<AtomicUsize>,
    fail_on: Option<usize>,
}

#[async_trait]
impl Activity for Counting {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("runs", "Counting")
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        tracing::info!("counting activity ran");
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(n) {
            return Err(ActivityError::new("scheduled failure"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn runner_persists_successive_runs_with_logs_and_history_in_order() {
    use tracing_subscriber::prelude::*;

    let collector = LogCollector::new();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = Orchestrator::new().with_log_sink(Arc::new(collector.clone()));
    orchestrator
        .add_activity(Counting { calls: calls.clone(), fail_on: Some(2) })
        .unwrap();

    let mut registry = WorkflowRegistry::new();
    registry.register("demo", Arc::new(orchestrator) as Arc<dyn Workflow>);

    let store = Arc::new(InMemoryRunStore::new(None));
    let runner = Runner::new(store).with_log_source(Arc::new(collector));

    let workflow = registry.get("demo").unwrap();

    let first = runner
        .run("demo", workflow.as_ref(), ExecutionContext::new(CancellationToken::new()))
        .await;
    assert_eq!(first.outcome, Some(RunOutcome::Succeeded));

    let second = runner
        .run("demo", workflow.as_ref(), ExecutionContext::new(CancellationToken::new()))
        .await;
    assert_eq!(second.outcome, Some(RunOutcome::Failed));

    let history = runner.history("demo").await;
    assert_eq!(history.len(), 2);
    // Most recent first.
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);

    let first_logs = runner.logs(&first.id).await.unwrap();
    assert!(first_logs.iter().any(|l| l.message.contains("counting activity ran")));

    let second_logs = runner.logs(&second.id).await.unwrap();
    assert!(second_logs.iter().any(|l| l.message.contains("activity failed")));

    // Each execution's `records` is that activity's slice of the run's logs,
    // not the whole run's log stream.
    let id = ActivityIdentity::new("runs", "Counting");
    let first_execution = first.executions.iter().find(|e| e.identity == id).unwrap();
    assert!(first_execution
        .records
        .iter()
        .any(|r| r.message.contains("counting activity ran")));
    assert!(first_execution.records.iter().all(|r| r.activity == Some(id.clone())));
}

struct ReportsProgress {
    status: StatusCollection,
}

#[async_trait]
impl Activity for ReportsProgress {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("runs", "ReportsProgress")
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        let id = self.identity();
        self.status.set(id.clone(), "1/2 archives");
        self.status.set(id, "2/2 archives");
        Ok(())
    }
}

#[tokio::test]
async fn activity_execution_status_log_captures_every_reported_line() {
    let status = StatusCollection::new();
    let mut orchestrator = Orchestrator::new().with_status(status.clone());
    orchestrator
        .add_activity(ReportsProgress { status: status.clone() })
        .unwrap();

    let mut registry = WorkflowRegistry::new();
    registry.register("progress", Arc::new(orchestrator) as Arc<dyn Workflow>);

    let store = Arc::new(InMemoryRunStore::new(None));
    let runner = Runner::new(store);
    let workflow = registry.get("progress").unwrap();

    let run = runner
        .run("progress", workflow.as_ref(), ExecutionContext::new(CancellationToken::new()))
        .await;

    let id = ActivityIdentity::new("runs", "ReportsProgress");
    let execution = run.executions.iter().find(|e| e.identity == id).unwrap();
    assert_eq!(execution.status_log, vec!["1/2 archives", "2/2 archives"]);
    // StatusCollection's own `get` still only reports the latest line.
    assert_eq!(status.get(&id), Some("2/2 archives".to_string()));
}
