// SPDX-License-Identifier: Apache-2.0
//! Dispatches a named [`Workflow`], records the dispatch as a [`Run`], and
//! persists it to a [`RunStore`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::application::workflow::{Workflow, WorkflowError};
use crate::domain::activity::ExecutionContext;
use crate::domain::run::{LogRecord, LogSource, Run, RunOutcome, CURRENT_RUN};

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save(&self, run: Run);
    /// Most recent run first.
    async fn history(&self, workflow: &str) -> Vec<Run>;
    async fn get(&self, id: &str) -> Option<Run>;
    async fn logs(&self, id: &str) -> Option<Vec<LogRecord>>;
}

/// Ties a workflow dispatch to run-history bookkeeping. One `Runner` can
/// dispatch any number of named workflows against the same store.
pub struct Runner<S: RunStore> {
    store: Arc<S>,
    log_source: Option<Arc<dyn LogSource>>,
}

impl<S: RunStore> Runner<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            log_source: None,
        }
    }

    /// Attaches a log collector whose buffered records are pulled into each
    /// finished `Run` before it's saved. Without one, `Run.logs` stays empty
    /// and callers fall back to whatever sink they wired the logs to live.
    pub fn with_log_source(mut self, source: Arc<dyn LogSource>) -> Self {
        self.log_source = Some(source);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runs `workflow` under the name `name`, scoping its execution so log
    /// capture and the resulting `Run` record line up, then saves the
    /// finished run to the store and returns it.
    pub async fn run(
        &self,
        name: impl Into<String>,
        workflow: &dyn Workflow,
        ctx: ExecutionContext,
    ) -> Run {
        let name = name.into();
        let mut run = Run::start(name, Utc::now());
        let run_id = run.id.clone();

        let outcome_result = CURRENT_RUN.scope(run_id.clone(), workflow.execute(ctx)).await;

        let outcome = match &outcome_result {
            Ok(()) => RunOutcome::Succeeded,
            Err(WorkflowError::Orchestrator(
                crate::application::orchestrator::OrchestratorError::Cancelled,
            )) => RunOutcome::Cancelled,
            Err(_) => RunOutcome::Failed,
        };

        run.finish(Utc::now(), outcome, workflow.activity_snapshot());
        if let Some(source) = &self.log_source {
            run.logs = source.take(&run_id);
            for execution in &mut run.executions {
                execution.records = run
                    .logs
                    .iter()
                    .filter(|record| record.activity.as_ref() == Some(&execution.identity))
                    .cloned()
                    .collect();
            }
        }
        self.store.save(run.clone()).await;
        run
    }

    pub async fn history(&self, workflow: &str) -> Vec<Run> {
        self.store.history(workflow).await
    }

    pub async fn logs(&self, run_id: &str) -> Option<Vec<LogRecord>> {
        self.store.logs(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::run_store::InMemoryRunStore;
    use async_trait::async_trait as at;
    use tokio_util::sync::CancellationToken;

    struct Noop;

    #[at]
    impl Workflow for Noop {
        async fn execute(&self, _ctx: ExecutionContext) -> Result<(), WorkflowError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_records_success_and_persists_to_store() {
        let store = Arc::new(InMemoryRunStore::new(None));
        let runner = Runner::new(store.clone());

        let run = runner
            .run("demo", &Noop, ExecutionContext::new(CancellationToken::new()))
            .await;

        assert_eq!(run.outcome, Some(RunOutcome::Succeeded));
        let history = runner.history("demo").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, run.id);
    }
}
