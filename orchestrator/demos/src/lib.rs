// SPDX-License-Identifier: Apache-2.0
//! A handful of minimal activities used to exercise
//! `activity-orchestrator-core` end to end: a delay, a shell command, and a
//! summary step that reads the command's output back out through a named
//! dependency edge.

use std::sync::Arc;
use std::time::Duration;

use activity_orchestrator_core::{
    Activity, ActivityError, ActivityIdentity, ActivityRef, Dependencies, ExecutionContext, Slot,
};
use async_trait::async_trait;
use tokio::process::Command;

/// Waits out a fixed delay, exiting early if cancelled.
pub struct Sleep {
    label: String,
    duration: Duration,
}

impl Sleep {
    pub fn new(label: impl Into<String>, duration: Duration) -> Self {
        Self {
            label: label.into(),
            duration,
        }
    }
}

#[async_trait]
impl Activity for Sleep {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new(module_path!(), "Sleep")
    }

    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<(), ActivityError> {
        tracing::info!(label = %self.label, duration_ms = self.duration.as_millis(), "sleeping");
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => Ok(()),
            _ = ctx.cancelled() => Err(ActivityError::new("cancelled while sleeping")),
        }
    }
}

/// Runs a shell command and exposes its captured stdout to dependents.
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    upstream: ActivityRef<Sleep>,
    stdout: Slot<String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            upstream: ActivityRef::unset(),
            stdout: Slot::unset(),
        }
    }

    pub fn stdout(&self) -> Option<&str> {
        self.stdout.try_get().map(String::as_str)
    }
}

#[async_trait]
impl Activity for ShellCommand {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new(module_path!(), "ShellCommand")
    }

    fn dependencies(self: &Arc<Self>) -> Dependencies {
        let mut deps = Dependencies::new();
        let me = Arc::clone(self);
        deps.activity_ref::<Sleep, _>(move |sleep| {
            let _ = me.upstream.slot().set(sleep);
        });
        deps
    }

    async fn init(&self) -> Result<(), ActivityError> {
        if self.program.trim().is_empty() {
            return Err(ActivityError::new("no program configured"));
        }
        Ok(())
    }

    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        let _warmed_up = self.upstream.get();
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| ActivityError::with_details("failed to spawn command", e.to_string()))?;
        if !output.status.success() {
            return Err(ActivityError::with_details(
                "command exited non-zero",
                format!("status: {}", output.status),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::info!(program = %self.program, %stdout, "command completed");
        let _ = self.stdout.set(stdout);
        Ok(())
    }
}

/// Reads back the upstream command's captured output and reports it through status.
pub struct Summarize {
    command: ActivityRef<ShellCommand>,
    status: activity_orchestrator_core::StatusCollection,
}

impl Summarize {
    pub fn new(status: activity_orchestrator_core::StatusCollection) -> Self {
        Self {
            command: ActivityRef::unset(),
            status,
        }
    }
}

#[async_trait]
impl Activity for Summarize {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new(module_path!(), "Summarize")
    }

    fn dependencies(self: &Arc<Self>) -> Dependencies {
        let mut deps = Dependencies::new();
        let me = Arc::clone(self);
        deps.activity_ref::<ShellCommand, _>(move |command| {
            let _ = me.command.slot().set(command);
        });
        deps
    }

    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }

    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        let command = self.command.get();
        let summary = match command.stdout() {
            Some(out) if !out.is_empty() => format!("command said: {out}"),
            _ => "command produced no output".to_string(),
        };
        self.status.set(self.identity(), summary);
        Ok(())
    }
}
