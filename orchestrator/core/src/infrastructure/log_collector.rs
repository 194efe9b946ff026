// SPDX-License-Identifier: Apache-2.0
//! Captures every `tracing` event emitted while an activity is executing,
//! tagging it with the activity's identity and enclosing run ID, regardless
//! of whatever level filter the process's ambient subscriber applies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::domain::activity::CURRENT_ACTIVITY;
use crate::domain::run::{LogRecord, LogSink, LogSource, CURRENT_RUN};

#[derive(Default)]
struct Buffers {
    by_run: HashMap<String, Vec<LogRecord>>,
}

/// Captures an event's `message` field separately and every other field into
/// `attributes`, so a captured [`LogRecord`] carries the same structured data
/// the base subscriber saw, not just the rendered message string.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    attributes: HashMap<String, serde_json::Value>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.insert(field, serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.insert(field, serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.insert(field, serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.insert(field, serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, serde_json::json!(value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.insert(field, serde_json::json!(format!("{value:?}")));
        }
    }
}

impl FieldVisitor {
    fn insert(&mut self, field: &tracing::field::Field, value: serde_json::Value) {
        self.attributes.insert(field.name().to_string(), value);
    }
}

/// A `tracing_subscriber::Layer` that buffers captured lines per run ID and,
/// optionally, forwards each one live to a [`LogSink`].
///
/// Cheap to clone: every clone shares the same backing buffers, so a single
/// collector can be installed once as a global layer and handed out to
/// callers that want to read a run's logs back. [`Self::with`] returns a
/// tagged handle sharing the same storage — a composable way to prefix
/// captured messages (e.g. per subsystem) without standing up a second
/// collector.
#[derive(Clone, Default)]
pub struct LogCollector {
    buffers: Arc<Mutex<Buffers>>,
    sink: Option<Arc<dyn LogSink>>,
    prefix: Option<String>,
}

impl LogCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    /// Returns a handle sharing this collector's storage, tagging every
    /// message it captures with `label`.
    pub fn with(&self, label: impl Into<String>) -> Self {
        Self {
            buffers: Arc::clone(&self.buffers),
            sink: self.sink.clone(),
            prefix: Some(label.into()),
        }
    }

    /// Removes and returns every record captured under `run_id` so far.
    pub fn take(&self, run_id: &str) -> Vec<LogRecord> {
        self.buffers
            .lock()
            .unwrap()
            .by_run
            .remove(run_id)
            .unwrap_or_default()
    }

    /// Like [`Self::take`] but leaves the buffer in place.
    pub fn peek(&self, run_id: &str) -> Vec<LogRecord> {
        self.buffers
            .lock()
            .unwrap()
            .by_run
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }

    fn capture(&self, mut record: LogRecord) {
        if let Some(prefix) = &self.prefix {
            record.message = format!("[{prefix}] {}", record.message);
        }
        if let Some(sink) = &self.sink {
            sink.record(record.clone());
        }
        if let Ok(run_id) = CURRENT_RUN.try_with(|r| r.clone()) {
            self.buffers
                .lock()
                .unwrap()
                .by_run
                .entry(run_id)
                .or_default()
                .push(record);
        }
    }
}

impl LogSource for LogCollector {
    fn take(&self, run_id: &str) -> Vec<LogRecord> {
        LogCollector::take(self, run_id)
    }
}

impl LogSink for LogCollector {
    fn record(&self, record: LogRecord) {
        self.capture(record);
    }
}

impl<S> Layer<S> for LogCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let activity = CURRENT_ACTIVITY.try_with(|a| a.clone()).ok();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.capture(LogRecord {
            activity,
            timestamp: chrono::Utc::now(),
            level: event.metadata().level().to_string(),
            message: visitor.message.unwrap_or_default(),
            attributes: visitor.attributes,
        });
    }
}
