// SPDX-License-Identifier: Apache-2.0
//! An in-memory [`RunStore`] adapter, suitable as the default store and as a
//! reference for a persistent implementation.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::runner::RunStore;
use crate::domain::run::{LogRecord, Run};

struct Inner {
    runs: VecDeque<Run>,
    capacity: Option<usize>,
}

/// Keeps every `Run` (and its captured logs) in process memory, newest last
/// internally but returned newest-first. With a `capacity`, the oldest run is
/// evicted once the bound is exceeded — an explicitly optional enhancement;
/// `None` keeps the full history for the process lifetime.
pub struct InMemoryRunStore {
    inner: Mutex<Inner>,
}

impl InMemoryRunStore {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                runs: VecDeque::new(),
                capacity,
            }),
        }
    }

    /// Drops every run that finished before `cutoff` (runs still in flight,
    /// i.e. with no `finished_at`, are never pruned).
    pub fn prune_before(&self, cutoff: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .runs
            .retain(|run| run.finished_at.map(|f| f >= cutoff).unwrap_or(true));
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: Run) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.runs.iter_mut().find(|r| r.id == run.id) {
            *existing = run;
        } else {
            inner.runs.push_back(run);
        }
        if let Some(capacity) = inner.capacity {
            while inner.runs.len() > capacity {
                inner.runs.pop_front();
            }
        }
    }

    async fn history(&self, workflow: &str) -> Vec<Run> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<Run> = inner
            .runs
            .iter()
            .filter(|r| r.workflow == workflow)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching
    }

    async fn get(&self, id: &str) -> Option<Run> {
        let inner = self.inner.lock().unwrap();
        inner.runs.iter().find(|r| r.id == id).cloned()
    }

    async fn logs(&self, id: &str) -> Option<Vec<LogRecord>> {
        let inner = self.inner.lock().unwrap();
        inner.runs.iter().find(|r| r.id == id).map(|r| r.logs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run::RunOutcome;

    fn run_at(workflow: &str, started_at: DateTime<Utc>) -> Run {
        let mut run = Run::start(workflow, started_at);
        run.finish(started_at, RunOutcome::Succeeded, vec![]);
        run
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let store = InMemoryRunStore::new(None);
        let t0 = Utc::now();
        store.save(run_at("wf", t0)).await;
        store.save(run_at("wf", t0 + chrono::Duration::seconds(1))).await;

        let history = store.history("wf").await;
        assert_eq!(history.len(), 2);
        assert!(history[0].started_at > history[1].started_at);
    }

    #[tokio::test]
    async fn bounded_capacity_evicts_oldest() {
        let store = InMemoryRunStore::new(Some(1));
        let t0 = Utc::now();
        store.save(run_at("wf", t0)).await;
        store.save(run_at("wf", t0 + chrono::Duration::seconds(1))).await;

        let history = store.history("wf").await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn prune_before_drops_old_finished_runs() {
        let store = InMemoryRunStore::new(None);
        let t0 = Utc::now();
        store.save(run_at("wf", t0)).await;
        store.save(run_at("wf", t0 + chrono::Duration::seconds(10))).await;

        store.prune_before(t0 + chrono::Duration::seconds(5));
        let history = store.history("wf").await;
        assert_eq!(history.len(), 1);
    }
}
