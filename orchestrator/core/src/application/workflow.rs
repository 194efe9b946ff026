// SPDX-License-Identifier: Apache-2.0
//! The `Workflow` abstraction: anything schedulable by the runner, including
//! the orchestrator itself and sequential compositions of other workflows.

use async_trait::async_trait;

use crate::application::orchestrator::{Orchestrator, OrchestratorError};
use crate::domain::activity::ExecutionContext;

#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("composed workflow '{name}' failed: {source}")]
    Composed {
        name: String,
        #[source]
        source: Box<WorkflowError>,
    },
}

/// Anything the runner can dispatch: an `Orchestrator`, or a `Compose` of
/// several workflows run one after another.
#[async_trait]
pub trait Workflow: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext) -> Result<(), WorkflowError>;

    /// A snapshot of per-activity terminal states produced by the most
    /// recent `execute` call, for the runner to attach to a `Run` record.
    /// Default: empty, for workflows with nothing activity-shaped to report.
    fn activity_snapshot(&self) -> Vec<crate::domain::run::ActivityExecution> {
        Vec::new()
    }
}

#[async_trait]
impl Workflow for Orchestrator {
    async fn execute(&self, ctx: ExecutionContext) -> Result<(), WorkflowError> {
        Orchestrator::execute(self, ctx).await.map_err(WorkflowError::from)
    }

    fn activity_snapshot(&self) -> Vec<crate::domain::run::ActivityExecution> {
        self.get_all_results()
            .into_iter()
            .map(|(identity, result)| {
                let status_log = self.status().log(&identity);
                crate::domain::run::ActivityExecution {
                    identity,
                    state: result.state,
                    error: result.error.map(|e| e.to_string()),
                    status_log,
                    records: Vec::new(),
                }
            })
            .collect()
    }
}

/// A named step in a [`Compose`] chain, so a failure can be attributed to the
/// workflow that produced it.
struct Named {
    name: String,
    workflow: Box<dyn Workflow>,
}

/// Runs a fixed sequence of workflows one after another against the same
/// cancellation context, stopping at the first failure.
pub struct Compose {
    steps: Vec<Named>,
}

impl Compose {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn then(mut self, name: impl Into<String>, workflow: impl Workflow + 'static) -> Self {
        self.steps.push(Named {
            name: name.into(),
            workflow: Box::new(workflow),
        });
        self
    }
}

impl Default for Compose {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Workflow for Compose {
    async fn execute(&self, ctx: ExecutionContext) -> Result<(), WorkflowError> {
        for step in &self.steps {
            step.workflow
                .execute(ctx.clone())
                .await
                .map_err(|source| WorkflowError::Composed {
                    name: step.name.clone(),
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    fn activity_snapshot(&self) -> Vec<crate::domain::run::ActivityExecution> {
        self.steps
            .iter()
            .flat_map(|step| step.workflow.activity_snapshot())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    struct Step(&'static str, std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl Workflow for Step {
        async fn execute(&self, _ctx: ExecutionContext) -> Result<(), WorkflowError> {
            self.1.lock().unwrap().push(self.0);
            Ok(())
        }
    }

    #[tokio::test]
    async fn compose_runs_steps_in_order() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let compose = Compose::new()
            .then("first", Step("first", log.clone()))
            .then("second", Step("second", log.clone()));

        compose
            .execute(ExecutionContext::new(CancellationToken::new()))
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    struct AlwaysFails;

    #[async_trait]
    impl Workflow for AlwaysFails {
        async fn execute(&self, _ctx: ExecutionContext) -> Result<(), WorkflowError> {
            Err(WorkflowError::Orchestrator(OrchestratorError::Cancelled))
        }
    }

    #[tokio::test]
    async fn compose_stops_at_first_failure() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let compose = Compose::new()
            .then("broken", AlwaysFails)
            .then("never", Step("never", log.clone()));

        let err = compose
            .execute(ExecutionContext::new(CancellationToken::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Composed { .. }));
        assert!(log.lock().unwrap().is_empty());
    }
}
