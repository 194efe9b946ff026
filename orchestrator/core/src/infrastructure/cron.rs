// SPDX-License-Identifier: Apache-2.0
//! Cron-triggered workflow dispatch: `workflows:cron_expr(;workflows:cron_expr)*`.
//!
//! Each `;`-separated declaration names one or more comma-separated workflows
//! that fire together, sequentially, on one schedule. Names are validated
//! against a caller-supplied registry of known workflow names at parse time.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::BoxFuture;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CronError {
    #[error("trigger references unknown workflow '{0}'")]
    UnknownWorkflow(String),
    #[error("workflow '{0}' named twice within one trigger")]
    DuplicateWorkflowInTrigger(String),
    #[error("invalid cron expression '{expr}': {source}")]
    InvalidExpression { expr: String, source: String },
    #[error("empty trigger declaration")]
    EmptyDeclaration,
}

/// One `names:cron_expr` declaration, parsed and validated.
pub struct Trigger {
    pub workflows: Vec<String>,
    pub schedule: Schedule,
    running: Arc<AsyncMutex<()>>,
    pub skipped: Arc<AtomicU64>,
}

impl Trigger {
    fn parse_one(declaration: &str, known: &HashSet<String>) -> Result<Self, CronError> {
        let (names_part, expr_part) = declaration
            .split_once(':')
            .ok_or(CronError::EmptyDeclaration)?;

        let names: Vec<String> = names_part
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Err(CronError::EmptyDeclaration);
        }

        let mut seen = HashSet::new();
        for name in &names {
            if !known.contains(name) {
                return Err(CronError::UnknownWorkflow(name.clone()));
            }
            if !seen.insert(name.clone()) {
                return Err(CronError::DuplicateWorkflowInTrigger(name.clone()));
            }
        }

        let expr = expr_part.trim();
        let schedule = Schedule::from_str(expr).map_err(|source| CronError::InvalidExpression {
            expr: expr.to_string(),
            source: source.to_string(),
        })?;

        Ok(Self {
            workflows: names,
            schedule,
            running: Arc::new(AsyncMutex::new(())),
            skipped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Whether the schedule has at least one occurrence in `(after, now]`.
    fn due_since(&self, after: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.schedule.after(&after).take_while(|t| *t <= now).next().is_some()
    }
}

/// Parses a full `workflows:cron_expr(;workflows:cron_expr)*` trigger string
/// into one [`Trigger`] per `;`-separated declaration.
pub fn parse_trigger_spec(spec: &str, known: &HashSet<String>) -> Result<Vec<Trigger>, CronError> {
    let triggers = spec
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|decl| Trigger::parse_one(decl, known))
        .collect::<Result<Vec<_>, _>>()?;
    if triggers.is_empty() {
        return Err(CronError::EmptyDeclaration);
    }
    Ok(triggers)
}

/// Polls registered triggers and dispatches the workflows named by whichever
/// ones come due.
#[derive(Default)]
pub struct CronScheduler {
    triggers: Vec<Trigger>,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trigger(&mut self, spec: &str, known: &HashSet<String>) -> Result<(), CronError> {
        self.triggers.extend(parse_trigger_spec(spec, known)?);
        Ok(())
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Polls once a second until `cancellation` fires. Within one trigger,
    /// its named workflows fire sequentially, one after another; separate
    /// triggers fire concurrently even if due at the same instant. A trigger
    /// whose previous firing is still running when it comes due again is
    /// skipped (and counted on `Trigger::skipped`) rather than queued —
    /// overlap prevention is per trigger, not cross-trigger.
    pub async fn run<F>(&self, dispatch: Arc<F>, cancellation: CancellationToken)
    where
        F: Fn(String) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let mut last_checked = Utc::now();
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let now = Utc::now();
            for trigger in &self.triggers {
                if !trigger.due_since(last_checked, now) {
                    continue;
                }
                let Ok(permit) = Arc::clone(&trigger.running).try_lock_owned() else {
                    trigger.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                };
                let workflows = trigger.workflows.clone();
                let dispatch = Arc::clone(&dispatch);
                tokio::spawn(async move {
                    for name in workflows {
                        dispatch(name).await;
                    }
                    drop(permit);
                });
            }
            last_checked = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_single_declaration() {
        let triggers = parse_trigger_spec("PowerOnPBS:0 0 3 * * *", &known(&["PowerOnPBS"])).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].workflows, vec!["PowerOnPBS"]);
    }

    #[test]
    fn parses_multiple_declarations_separated_by_semicolon() {
        let triggers = parse_trigger_spec(
            "A:0 0 3 * * *;B:0 0 4 * * *",
            &known(&["A", "B"]),
        )
        .unwrap();
        assert_eq!(triggers.len(), 2);
    }

    #[test]
    fn parses_comma_separated_workflows_in_one_trigger() {
        let triggers = parse_trigger_spec("A,B:0 0 3 * * *", &known(&["A", "B"])).unwrap();
        assert_eq!(triggers[0].workflows, vec!["A", "B"]);
    }

    #[test]
    fn rejects_unknown_workflow_name() {
        let err = parse_trigger_spec("Ghost:0 0 3 * * *", &known(&["A"])).unwrap_err();
        assert!(matches!(err, CronError::UnknownWorkflow(name) if name == "Ghost"));
    }

    #[test]
    fn rejects_duplicate_name_within_one_trigger() {
        let err = parse_trigger_spec("A,A:0 0 3 * * *", &known(&["A"])).unwrap_err();
        assert!(matches!(err, CronError::DuplicateWorkflowInTrigger(name) if name == "A"));
    }

    #[test]
    fn rejects_malformed_cron_expression() {
        let err = parse_trigger_spec("A:not-a-cron-expr", &known(&["A"])).unwrap_err();
        assert!(matches!(err, CronError::InvalidExpression { .. }));
    }

    #[test]
    fn rejects_a_spec_with_no_declarations() {
        assert!(matches!(
            parse_trigger_spec("", &known(&["A"])),
            Err(CronError::EmptyDeclaration)
        ));
        assert!(matches!(
            parse_trigger_spec(";;;", &known(&["A"])),
            Err(CronError::EmptyDeclaration)
        ));
    }

    #[test]
    fn due_since_detects_an_occurrence_in_range() {
        let triggers = parse_trigger_spec("A:* * * * * *", &known(&["A"])).unwrap();
        let now = Utc::now();
        assert!(triggers[0].due_since(now - chrono::Duration::seconds(2), now));
    }
}
