// SPDX-License-Identifier: Apache-2.0
//! Run history value objects: one [`Run`] per workflow dispatch, its
//! per-activity executions, and the log records captured during it.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::activity::ActivityState;
use crate::domain::identity::ActivityIdentity;

tokio::task_local! {
    /// The ID of the run currently executing on this task, if any. Set by
    /// `application::runner::Runner` as a scope around a workflow's
    /// `execute` future; read by `infrastructure::log_collector` so captured
    /// log lines can be filed under the right `Run`.
    pub static CURRENT_RUN: String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
            RunOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A snapshot of one activity's terminal state within a finished run.
///
/// `status_log` is everything that activity reported through the
/// [`crate::domain::status::StatusCollection`] over the course of the run, not
/// just its last value (that's what `StatusCollection::get`/`all` are for);
/// `records` is this activity's slice of the run's captured log lines. Both
/// are populated by the `Runner` after a run finishes, from whatever status
/// collection and log source the workflow was wired with — a workflow with
/// neither wired simply reports both as empty.
#[derive(Debug, Clone)]
pub struct ActivityExecution {
    pub identity: ActivityIdentity,
    pub state: ActivityState,
    pub error: Option<String>,
    pub status_log: Vec<String>,
    pub records: Vec<LogRecord>,
}

/// One captured log line, tagged with the activity that emitted it (`None`
/// for lines emitted outside any activity's execution, e.g. orchestrator
/// bookkeeping).
///
/// `attributes` holds every structured field the emitting call passed besides
/// `message` (e.g. `tracing::info!(attempt = 3, "hello")` captures `attempt`),
/// so a collector's fidelity can be checked field-for-field against what the
/// base sink received, not just by message text.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub activity: Option<ActivityIdentity>,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub attributes: std::collections::HashMap<String, serde_json::Value>,
}

/// Port an infrastructure log collector implements to receive every
/// [`LogRecord`] as it is captured, independent of the run store's own
/// per-run log buffer. Lets a caller stream logs live (e.g. to stdout or an
/// external aggregator) instead of only reading them back after a run ends.
pub trait LogSink: Send + Sync {
    fn record(&self, record: LogRecord);
}

/// Port a log collector implements to hand back everything it buffered for a
/// finished run, so a [`crate::application::runner::Runner`] can attach it to
/// the [`Run`] record before saving. The counterpart read side to [`LogSink`]'s
/// write side.
pub trait LogSource: Send + Sync {
    fn take(&self, run_id: &str) -> Vec<LogRecord>;
}

/// One dispatch of a named workflow, from scheduling to completion.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
    pub executions: Vec<ActivityExecution>,
    pub logs: Vec<LogRecord>,
}

impl Run {
    pub fn start(workflow: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        let workflow = workflow.into();
        Self {
            id: calculate_id(&workflow, started_at),
            workflow,
            started_at,
            finished_at: None,
            outcome: None,
            executions: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>, outcome: RunOutcome, executions: Vec<ActivityExecution>) {
        self.finished_at = Some(finished_at);
        self.outcome = Some(outcome);
        self.executions = executions;
    }
}

/// Deterministic run ID: a hex SHA-256 digest of `workflow` and the RFC 3339
/// `started_at` timestamp, so replaying the exact same dispatch (same
/// workflow, same instant) always yields the same ID — useful for
/// idempotent retries from an external scheduler.
pub fn calculate_id(workflow: &str, started_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workflow.as_bytes());
    hasher.update(b"@");
    hasher.update(started_at.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
