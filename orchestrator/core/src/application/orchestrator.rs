// SPDX-License-Identifier: Apache-2.0
//! The orchestrator: wires activities together and runs them.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::application::injector::{Injector, InjectorError};
use crate::domain::activity::{
    Activity, ActivityError, ActivityResult, ActivityState, CURRENT_ACTIVITY, ExecutionContext,
};
use crate::domain::config::{ConfigError, Configuration};
use crate::domain::graph::{DependencyGraph, GraphError};
use crate::domain::identity::ActivityIdentity;
use crate::domain::run::LogSink;
use crate::domain::status::StatusCollection;

#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestratorError {
    #[error("activity {0} was already added to this orchestrator")]
    DuplicateActivity(ActivityIdentity),
    #[error("{identity}: dependency on {type_name} is unsatisfiable")]
    MissingDependency {
        identity: ActivityIdentity,
        type_name: &'static str,
    },
    #[error("{identity}: field of type {type_name} names an activity but was wired as a value")]
    BadDependencyType {
        identity: ActivityIdentity,
        type_name: &'static str,
    },
    #[error("circular dependency: {}", cycle.iter().map(|i| i.short_string()).collect::<Vec<_>>().join(" -> "))]
    CircularDependency { cycle: Vec<ActivityIdentity> },
    #[error("{identity}: config binding failed: {source}")]
    ConfigTypeMismatch {
        identity: ActivityIdentity,
        #[source]
        source: ConfigError,
    },
    #[error("{identity}: init failed: {source}")]
    InitializationFailed {
        identity: ActivityIdentity,
        #[source]
        source: ActivityError,
    },
    #[error("execution was cancelled")]
    Cancelled,
    #[error("{identity}: execute failed: {source}")]
    ExecuteFailed {
        identity: ActivityIdentity,
        #[source]
        source: ActivityError,
    },
}

impl From<InjectorError> for OrchestratorError {
    fn from(err: InjectorError) -> Self {
        match err {
            InjectorError::MissingDependency { identity, type_name } => {
                OrchestratorError::MissingDependency { identity, type_name }
            }
            InjectorError::BadDependencyType { identity, type_name } => {
                OrchestratorError::BadDependencyType { identity, type_name }
            }
            InjectorError::Config { identity, source } => {
                OrchestratorError::ConfigTypeMismatch { identity, source }
            }
        }
    }
}

impl From<GraphError> for OrchestratorError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CircularDependency { cycle } => OrchestratorError::CircularDependency { cycle },
        }
    }
}

/// Tunables beyond the spec-mandated behavior; see `SPEC_FULL.md` §C.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    /// Caps how many activities run concurrently. `None` (default) lets the
    /// whole ready front run at once, bounded only by the dependency graph's
    /// own shape.
    pub max_parallelism: Option<usize>,
}

struct ActivitySlot {
    instance: Arc<dyn Activity>,
    dependencies: crate::domain::activity::Dependencies,
}

/// Composes registered activities into a dependency-ordered, concurrently
/// scheduled run. One orchestrator instance is built once (via
/// `add_activity`/`inject`/`provide`) and then `execute`d, possibly more than
/// once if `Execute` is called again — each call resets per-run state.
pub struct Orchestrator {
    injector: Injector,
    order: Vec<ActivityIdentity>,
    slots: HashMap<ActivityIdentity, ActivitySlot>,
    type_to_identity: HashMap<TypeId, ActivityIdentity>,
    options: OrchestratorOptions,
    results: Arc<DashMap<ActivityIdentity, ActivityResult>>,
    log_sink: Option<Arc<dyn LogSink>>,
    status: StatusCollection,
    shutdown: CancellationToken,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            injector: Injector::new(),
            order: Vec::new(),
            slots: HashMap::new(),
            type_to_identity: HashMap::new(),
            options: OrchestratorOptions::default(),
            results: Arc::new(DashMap::new()),
            log_sink: None,
            status: StatusCollection::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replaces the orchestrator's status collection with a caller-supplied
    /// one, so status updates can be read (or shared across workflows) from
    /// outside without going through `get_all_results`.
    pub fn with_status(mut self, status: StatusCollection) -> Self {
        self.status = status;
        self
    }

    /// The live status collection this orchestrator reports through. Every
    /// failing activity's status line is set to `"❌ " + error.message`
    /// (§7); successful completions are not given a status line of their own
    /// — activities that want one call `status().set(...)` themselves from
    /// `execute`, e.g. to report progress.
    pub fn status(&self) -> &StatusCollection {
        &self.status
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_config(mut self, config: Configuration) -> Self {
        self.injector.set_config(config);
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn with_max_parallelism(mut self, max: usize) -> Self {
        self.options.max_parallelism = Some(max);
        self
    }

    /// Registers a shared collaborator value, available to any activity that
    /// declares `Dependencies::collaborator::<T>()` and is not itself a
    /// registered activity of type `T`.
    pub fn inject<T: Send + Sync + 'static>(&mut self, value: T) {
        self.injector.register_singleton(value);
    }

    /// Registers a per-activity factory: invoked once per dependent activity
    /// (not shared), receiving that activity's identity.
    pub fn provide<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ActivityIdentity) -> T + Send + Sync + 'static,
    {
        self.injector.register_factory(factory);
    }

    pub fn add_activity<T: Activity>(&mut self, activity: T) -> Result<(), OrchestratorError> {
        let instance = Arc::new(activity);
        let identity = instance.identity();
        if self.slots.contains_key(&identity) {
            return Err(OrchestratorError::DuplicateActivity(identity));
        }
        let dependencies = T::dependencies(&instance);
        self.injector.register_activity(Arc::clone(&instance));
        self.type_to_identity.insert(TypeId::of::<T>(), identity.clone());
        self.order.push(identity.clone());
        self.results.insert(identity.clone(), ActivityResult::not_started());
        self.slots.insert(
            identity,
            ActivitySlot {
                instance: instance as Arc<dyn Activity>,
                dependencies,
            },
        );
        Ok(())
    }

    pub fn get_all_results(&self) -> HashMap<ActivityIdentity, ActivityResult> {
        self.results
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Cancels any `execute` call currently in flight on this orchestrator.
    /// Not-yet-started activities transition to `Skipped`; running ones are
    /// signalled via their `ExecutionContext` and are expected to exit
    /// promptly, but are not forcibly aborted.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn build_graph(&self) -> DependencyGraph {
        let mut edges = HashMap::new();
        for id in &self.order {
            let deps = &self.slots[id].dependencies;
            let mut targets = Vec::new();
            for binding in &deps.activity_refs {
                if let Some(target) = self.type_to_identity.get(&binding.type_id) {
                    targets.push(target.clone());
                }
            }
            for binding in &deps.anonymous_refs {
                if let Some(target) = self.type_to_identity.get(&binding.type_id) {
                    targets.push(target.clone());
                }
            }
            edges.insert(id.clone(), targets);
        }
        DependencyGraph::new(self.order.clone(), edges)
    }

    fn topological_order(&self, graph: &DependencyGraph) -> Vec<ActivityIdentity> {
        let mut settled: HashSet<ActivityIdentity> = HashSet::new();
        let mut order = Vec::with_capacity(self.order.len());
        let empty = HashSet::new();
        while order.len() < self.order.len() {
            let mut front = graph.ready_front(&settled, &empty);
            front.sort();
            if front.is_empty() {
                break;
            }
            for id in front {
                settled.insert(id.clone());
                order.push(id);
            }
        }
        order
    }
}

impl Orchestrator {
    /// Validate, inject, and init every activity; then schedule and run them
    /// concurrently, respecting the dependency graph. Validation/injection/init
    /// failures abort before any `execute` call is made. Individual activities'
    /// `execute` failures do not abort the run: they are recorded on that
    /// activity's result and cascade as `Skipped` to its dependents, while
    /// independent branches keep running. Returns `Err` only for a structural
    /// failure or cancellation; inspect `get_all_results` for per-activity outcomes.
    pub async fn execute(&self, ctx: ExecutionContext) -> Result<(), OrchestratorError> {
        // Reset per-run state before any fallible step, so a structural
        // failure (cycle, missing dependency, bad config, failed init) still
        // leaves `get_all_results` reporting every registered activity as
        // `not_started` rather than empty (first run) or stale (a rerun).
        self.results.clear();
        for id in &self.order {
            self.results.insert(id.clone(), ActivityResult::not_started());
        }

        let graph = self.build_graph();
        graph.detect_cycle()?;

        for id in &self.order {
            self.injector.resolve(id, &self.slots[id].dependencies)?;
        }

        let init_order = self.topological_order(&graph);
        for id in &init_order {
            let activity = Arc::clone(&self.slots[id].instance);
            activity
                .init()
                .await
                .map_err(|source| OrchestratorError::InitializationFailed {
                    identity: id.clone(),
                    source,
                })?;
        }

        let run_cancellation = merge_tokens(ctx.child_token(), self.shutdown.clone());

        let mut settled: HashSet<ActivityIdentity> = HashSet::new();
        let mut in_flight: HashSet<ActivityIdentity> = HashSet::new();
        let mut first_error: Option<OrchestratorError> = None;
        let semaphore = self
            .options
            .max_parallelism
            .map(|n| Arc::new(tokio::sync::Semaphore::new(n.max(1))));
        let mut tasks: tokio::task::JoinSet<(ActivityIdentity, ActivityResult)> =
            tokio::task::JoinSet::new();

        loop {
            let ready = graph.ready_front(&settled, &in_flight);
            for id in ready {
                let dependency_failed = graph.dependencies_of(&id).iter().any(|dep| {
                    self.results
                        .get(dep)
                        .map(|r| r.state == ActivityState::Skipped || r.error.is_some())
                        .unwrap_or(false)
                });
                if dependency_failed || run_cancellation.is_cancelled() {
                    self.results.insert(id.clone(), ActivityResult {
                        state: ActivityState::Skipped,
                        error: None,
                    });
                    self.emit_log(Some(id.clone()), "activity skipped: an upstream dependency failed or the run was cancelled");
                    settled.insert(id);
                    continue;
                }

                self.results.insert(id.clone(), ActivityResult {
                    state: ActivityState::Pending,
                    error: None,
                });
                in_flight.insert(id.clone());

                let activity = Arc::clone(&self.slots[&id].instance);
                let activity_ctx = ExecutionContext::new(run_cancellation.clone());
                let permit_source = semaphore.clone();
                let results = Arc::clone(&self.results);
                let spawned_id = id.clone();

                tasks.spawn(async move {
                    let _permit = match permit_source {
                        Some(sem) => sem.acquire_owned().await.ok(),
                        None => None,
                    };
                    results.insert(spawned_id.clone(), ActivityResult {
                        state: ActivityState::Running,
                        error: None,
                    });
                    let outcome = CURRENT_ACTIVITY
                        .scope(spawned_id.clone(), activity.execute(activity_ctx))
                        .await;
                    let result = match outcome {
                        Ok(()) => ActivityResult {
                            state: ActivityState::Completed,
                            error: None,
                        },
                        Err(err) => ActivityResult {
                            state: ActivityState::Completed,
                            error: Some(err),
                        },
                    };
                    (spawned_id, result)
                });
            }

            if in_flight.is_empty() && settled.len() == self.order.len() {
                break;
            }

            match tasks.join_next().await {
                Some(Ok((id, result))) => {
                    in_flight.remove(&id);
                    settled.insert(id.clone());
                    match &result.error {
                        Some(err) => {
                            self.emit_log(Some(id.clone()), &format!("activity failed: {err}"));
                            self.status.set(id.clone(), format!("❌ {err}"));
                            if first_error.is_none() {
                                first_error = Some(OrchestratorError::ExecuteFailed {
                                    identity: id.clone(),
                                    source: err.clone(),
                                });
                            }
                        }
                        None => self.emit_log(Some(id.clone()), "activity completed"),
                    }
                    self.results.insert(id, result);
                }
                Some(Err(join_err)) => {
                    return Err(OrchestratorError::InitializationFailed {
                        identity: ActivityIdentity::new("orchestrator", "scheduler"),
                        source: ActivityError::new(format!("activity task panicked: {join_err}")),
                    });
                }
                None => {
                    if settled.len() == self.order.len() {
                        break;
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        if run_cancellation.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }
        Ok(())
    }

    fn emit_log(&self, activity: Option<ActivityIdentity>, message: &str) {
        if let Some(sink) = &self.log_sink {
            sink.record(crate::domain::run::LogRecord {
                activity,
                timestamp: chrono::Utc::now(),
                level: "info".to_string(),
                message: message.to_string(),
                attributes: HashMap::new(),
            });
        }
    }
}

fn merge_tokens(a: CancellationToken, b: CancellationToken) -> CancellationToken {
    let merged = CancellationToken::new();
    let merged_a = merged.clone();
    tokio::spawn(async move {
        a.cancelled().await;
        merged_a.cancel();
    });
    let merged_b = merged.clone();
    tokio::spawn(async move {
        b.cancelled().await;
        merged_b.cancel();
    });
    merged
}
