// SPDX-License-Identifier: Apache-2.0
//! Composition entrypoints: the glue a caller's `main` uses to name
//! workflows, wire them to cron triggers, and dispatch them through a
//! `Runner` so every firing is recorded.
//!
//! Nothing here is mandatory — `Orchestrator`, `Compose`, `Runner`, and
//! `CronScheduler` are each independently usable — but most callers want
//! exactly this: a name -> `Workflow` registry, a trigger string validated
//! against it, and a loop that dispatches due workflows through one runner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::application::runner::{RunStore, Runner};
use crate::application::workflow::Workflow;
use crate::domain::activity::ExecutionContext;
use crate::infrastructure::cron::{CronError, CronScheduler};

/// Maps workflow names to the `Workflow` implementations that run under
/// them. The same name space a cron trigger string is validated against.
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Arc<dyn Workflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, workflow: Arc<dyn Workflow>) -> &mut Self {
        self.workflows.insert(name.into(), workflow);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Workflow>> {
        self.workflows.get(name).cloned()
    }

    pub fn names(&self) -> HashSet<String> {
        self.workflows.keys().cloned().collect()
    }
}

/// Ties a [`WorkflowRegistry`] to a [`Runner`] and a [`CronScheduler`]: the
/// default shape of a `main` built on this crate.
pub struct CompositionRoot<S: RunStore + 'static> {
    pub registry: WorkflowRegistry,
    pub runner: Arc<Runner<S>>,
    scheduler: CronScheduler,
}

impl<S: RunStore + 'static> CompositionRoot<S> {
    pub fn new(registry: WorkflowRegistry, runner: Arc<Runner<S>>) -> Self {
        Self {
            registry,
            runner,
            scheduler: CronScheduler::new(),
        }
    }

    /// Parses and validates `trigger_spec` against the registry's current
    /// workflow names, adding the resulting triggers to the scheduler.
    pub fn add_cron_trigger(&mut self, trigger_spec: &str) -> Result<(), CronError> {
        self.scheduler.add_trigger(trigger_spec, &self.registry.names())
    }

    /// Runs the cron scheduler until `cancellation` fires. Each due workflow
    /// name is looked up in the registry and dispatched through the runner
    /// (unknown names, which should not occur given `add_cron_trigger`
    /// validates against the registry up front, are logged and skipped).
    pub async fn run_forever(&self, cancellation: CancellationToken) {
        let registry_workflows: HashMap<String, Arc<dyn Workflow>> = self
            .registry
            .workflows
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        let runner = Arc::clone(&self.runner);
        let registry_workflows = Arc::new(registry_workflows);
        let cancellation_for_dispatch = cancellation.clone();

        let dispatch = Arc::new(move |name: String| -> BoxFuture<'static, ()> {
            let runner = Arc::clone(&runner);
            let workflows = Arc::clone(&registry_workflows);
            let ctx = ExecutionContext::new(cancellation_for_dispatch.child_token());
            Box::pin(async move {
                if let Some(workflow) = workflows.get(&name) {
                    runner.run(name, workflow.as_ref(), ctx).await;
                } else {
                    tracing::warn!(workflow = %name, "cron fired for a workflow no longer in the registry");
                }
            })
        });

        self.scheduler.run(dispatch, cancellation).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::workflow::WorkflowError;
    use crate::infrastructure::run_store::InMemoryRunStore;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Workflow for Noop {
        async fn execute(&self, _ctx: ExecutionContext) -> Result<(), WorkflowError> {
            Ok(())
        }
    }

    #[test]
    fn registry_tracks_registered_names() {
        let mut registry = WorkflowRegistry::new();
        registry.register("demo", Arc::new(Noop));
        assert!(registry.names().contains("demo"));
        assert!(registry.get("demo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn add_cron_trigger_validates_against_registry() {
        let mut registry = WorkflowRegistry::new();
        registry.register("demo", Arc::new(Noop));
        let runner = Arc::new(Runner::new(Arc::new(InMemoryRunStore::new(None))));
        let mut root = CompositionRoot::new(registry, runner);

        assert!(root.add_cron_trigger("demo:0 0 3 * * *").is_ok());
        assert!(root.add_cron_trigger("ghost:0 0 3 * * *").is_err());
    }
}
