// SPDX-License-Identifier: Apache-2.0
//! # activity-orchestrator-core
//!
//! A reusable runtime that composes arbitrary user-defined units of work
//! ("activities") into dependency-ordered workflows, with static (reflection-free)
//! dependency injection, per-activity factory-produced collaborators, parallel
//! execution with failure isolation, and real-time status/log capture per activity.
//!
//! ## Layer Structure
//!
//! ```text
//! application/    ← Injector, Orchestrator (validate → init → schedule → execute),
//!                   Workflow composition, cron-driven Runner
//!     ↓
//! domain/         ← Activity contract, Identity, DependencyGraph, Configuration
//!                   binder, StatusCollection, Run/ActivityExecution records
//!     ↓
//! infrastructure/ ← Capturing log layer, cron trigger parser + scheduler,
//!                   in-memory run store, external-collaborator interfaces
//! ```
//!
//! Concrete collaborators (an IPMI controller, an SSH client, a Proxmox or PBS
//! REST client, a metrics pusher, an HTTP/UI surface, a YAML config loader) and
//! the concrete activities built on top of them are out of scope for this crate;
//! it only defines the contracts they plug into. See `orchestrator/demos` for a
//! pair of minimal activities used to exercise the orchestrator end-to-end.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::activity::{
    Activity, ActivityError, ActivityResult, ActivityState, AnonymousRef, ActivityRef,
    Dependencies, ExecutionContext, Slot,
};
pub use domain::config::{ConfigError, Configuration};
pub use domain::graph::{DependencyGraph, GraphError};
pub use domain::identity::ActivityIdentity;
pub use domain::run::{ActivityExecution, LogRecord, LogSink, LogSource, Run, RunOutcome};
pub use domain::status::{StatusChange, StatusCollection};
pub use application::composition::{CompositionRoot, WorkflowRegistry};
pub use application::injector::{Injector, InjectorError};
pub use application::orchestrator::{Orchestrator, OrchestratorError, OrchestratorOptions};
pub use application::runner::{RunStore, Runner};
pub use application::workflow::{Compose, Workflow, WorkflowError};
pub use infrastructure::collaborators::{
    CollaboratorError, IpmiController, MetricsPushClient, PbsClient, ProxmoxClient, SshClient,
};
pub use infrastructure::cron::{CronError, CronScheduler, Trigger};
pub use infrastructure::log_collector::LogCollector;
pub use infrastructure::run_store::InMemoryRunStore;
