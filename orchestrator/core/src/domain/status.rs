// SPDX-License-Identifier: Apache-2.0
//! Thread-safe, free-text status reporting keyed by activity identity.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::identity::ActivityIdentity;

/// One status update, as published on [`StatusCollection::subscribe`].
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub identity: ActivityIdentity,
    pub status: String,
}

/// A shared bulletin board activities use to report human-readable progress
/// ("uploading 3/12 archives") independent of their terminal
/// [`crate::domain::activity::ActivityResult`]. Safe to clone: it is a thin,
/// `Arc`-backed handle over a concurrent map.
///
/// Alongside the live "current value" map `Get`/`All` read, every `Set` is
/// also appended to a per-activity history (`log`), which is what backs a
/// finished run's `ActivityExecution::status_log` — the sequence of
/// everything that activity ever reported, not just the last line.
#[derive(Clone)]
pub struct StatusCollection {
    entries: std::sync::Arc<DashMap<ActivityIdentity, String>>,
    history: std::sync::Arc<DashMap<ActivityIdentity, Vec<String>>>,
    changes: broadcast::Sender<StatusChange>,
}

impl Default for StatusCollection {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            entries: std::sync::Arc::new(DashMap::new()),
            history: std::sync::Arc::new(DashMap::new()),
            changes,
        }
    }
}

impl StatusCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: ActivityIdentity, status: impl Into<String>) {
        let status = status.into();
        self.entries.insert(id.clone(), status.clone());
        self.history.entry(id.clone()).or_default().push(status.clone());
        let _ = self.changes.send(StatusChange { identity: id, status });
    }

    pub fn get(&self, id: &ActivityIdentity) -> Option<String> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// A deep-copied snapshot: mutating the returned map never affects the collection.
    pub fn all(&self) -> std::collections::HashMap<ActivityIdentity, String> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Every status line `id` has ever reported, oldest first.
    pub fn log(&self, id: &ActivityIdentity) -> Vec<String> {
        self.history.get(id).map(|entry| entry.value().clone()).unwrap_or_default()
    }

    /// Subscribe to live status changes. Purely additive: `Get`/`Set`/`All`
    /// behave exactly as specified whether or not anything is subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.history.clear();
    }
}
