// SPDX-License-Identifier: Apache-2.0
//! The Activity contract: identity, lifecycle, state machine, and the
//! reflection-free dependency-declaration surface activities use to opt into
//! injection.
//!
//! The source system discovers an activity's injectable fields and its
//! dependency edges through runtime reflection over struct tags. Rust has no
//! such reflection, so per the design notes this becomes an explicit wiring
//! API: every [`Activity`] declares its needs once, in [`Activity::dependencies`],
//! by registering typed setter closures on a [`Dependencies`] descriptor. Each
//! closure closes over a [`Slot`] field the activity exposes for reading the
//! resolved value later, from `init`/`execute`.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::identity::ActivityIdentity;

tokio::task_local! {
    /// The identity of the activity currently executing on this task, if any.
    ///
    /// Set by `Orchestrator::execute` as a scope around each activity's
    /// `execute` future; read by `infrastructure::log_collector`'s tracing
    /// layer to tag every event emitted while that future is polled, without
    /// the activity itself having to thread its identity through `tracing`
    /// spans by hand.
    pub static CURRENT_ACTIVITY: ActivityIdentity;
}

// ============================================================================
// Activity state machine
// ============================================================================

/// Monotonic lifecycle state of one activity within one orchestrator run.
///
/// Transitions: `NotStarted -> Pending -> Running -> {Skipped | Completed}`,
/// plus the direct `NotStarted -> Skipped` shortcut taken when execution is
/// aborted (cancelled, or an ancestor failed) before the activity is ever
/// admitted to the scheduler's ready front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActivityState {
    NotStarted,
    Pending,
    Running,
    Skipped,
    Completed,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityState::NotStarted => "not_started",
            ActivityState::Pending => "pending",
            ActivityState::Running => "running",
            ActivityState::Skipped => "skipped",
            ActivityState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// An error surfaced by an activity's own `init` or `execute`.
///
/// Kept as a plain message + optional detail (mirroring the source system's
/// `IterationError`) rather than a boxed `dyn Error`, so that `Result` values
/// can be cloned into `GetAllResults()` snapshots and `Run` records without
/// requiring every activity author's error type to be `Clone`.
#[derive(Debug, Clone)]
pub struct ActivityError {
    pub message: String,
    pub details: Option<String>,
}

impl ActivityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ActivityError {}

/// `{state, error}` exactly as specified: success iff `state == Completed &&
/// error.is_none()`. `error` is populated only by a failing `execute` — init
/// failure short-circuits the whole `Execute` call instead (see
/// `OrchestratorError::InitializationFailed`) and is never recorded here.
#[derive(Debug, Clone)]
pub struct ActivityResult {
    pub state: ActivityState,
    pub error: Option<ActivityError>,
}

impl ActivityResult {
    pub fn not_started() -> Self {
        Self {
            state: ActivityState::NotStarted,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, ActivityState::Completed) && self.error.is_none()
    }
}

// ============================================================================
// Execution context (cancellation)
// ============================================================================

/// Carried into `execute`. Wraps the single cancellation token that
/// propagates to every in-flight activity for one `Execute` call.
#[derive(Clone)]
pub struct ExecutionContext {
    cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the run is cancelled. Activities with blocking bodies
    /// (I/O, polling, sleeps) must race this against their own work and
    /// return a cancellation error promptly when it resolves.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn child_token(&self) -> CancellationToken {
        self.cancellation.child_token()
    }
}

// ============================================================================
// Injection slots
// ============================================================================

/// A single injectable field. Backed by a `OnceLock`, set at most once by the
/// injector before any activity's `init` runs.
///
/// Reading an unset slot panics, mirroring a nil-dereference on an
/// un-populated reflective field in the source system: it is always a bug in
/// either the orchestrator's injection bookkeeping or the activity's `init`
/// (which is the place to turn "slot legitimately left empty because nothing
/// satisfied it" into a proper `MissingDependency` error via
/// [`Slot::try_get`]).
pub struct Slot<T> {
    inner: OnceLock<T>,
}

impl<T> Slot<T> {
    pub const fn unset() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Called by the injector. Returns `Err(value)` if already set (a slot is
    /// written at most once; a second write is a bug in the binding, not a
    /// runtime condition activities need to handle).
    pub fn set(&self, value: T) -> Result<(), T> {
        self.inner.set(value)
    }

    pub fn is_set(&self) -> bool {
        self.inner.get().is_some()
    }

    pub fn try_get(&self) -> Option<&T> {
        self.inner.get()
    }

    pub fn get(&self) -> &T {
        self.inner
            .get()
            .expect("dependency slot read before injection completed")
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::unset()
    }
}

/// A named, readable dependency on another registered activity. Set by the
/// injector when the edge is resolved; read via [`ActivityRef::get`].
pub struct ActivityRef<T: ?Sized> {
    slot: Slot<Arc<T>>,
}

impl<T: ?Sized> ActivityRef<T> {
    pub const fn unset() -> Self {
        Self { slot: Slot::unset() }
    }

    pub fn get(&self) -> &Arc<T> {
        self.slot.get()
    }

    pub fn try_get(&self) -> Option<&Arc<T>> {
        self.slot.try_get()
    }

    pub(crate) fn slot(&self) -> &Slot<Arc<T>> {
        &self.slot
    }
}

impl<T: ?Sized> Default for ActivityRef<T> {
    fn default() -> Self {
        Self::unset()
    }
}

/// An ordering-only dependency on another registered activity: contributes a
/// graph edge but is deliberately unreadable by the owning activity (no
/// accessor is exposed), matching "anonymous fields ... are deliberately left
/// unreadable ... a supported pattern for run-after ordering."
pub struct AnonymousRef<T: ?Sized> {
    _marker: std::marker::PhantomData<Arc<T>>,
}

impl<T: ?Sized> AnonymousRef<T> {
    pub const fn unset() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: ?Sized> Default for AnonymousRef<T> {
    fn default() -> Self {
        Self::unset()
    }
}

// ============================================================================
// Dependency declarations
// ============================================================================

/// Why an attempted binding was rejected or fell through at injection time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DependencyBindError {
    #[error("dependency slot for {type_name} was already set")]
    AlreadySet { type_name: &'static str },
    #[error("resolved value for {type_name} did not match the declared field type")]
    TypeMismatch { type_name: &'static str },
}

pub(crate) struct CollaboratorBinding {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub apply: Box<dyn Fn(Arc<dyn Any + Send + Sync>) -> Result<(), DependencyBindError> + Send + Sync>,
}

pub(crate) struct ActivityRefBinding {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub apply: Box<dyn Fn(Arc<dyn Any + Send + Sync>) -> Result<(), DependencyBindError> + Send + Sync>,
}

pub(crate) struct AnonymousRefBinding {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

pub(crate) struct ConfigBinding {
    pub path: String,
    pub type_name: &'static str,
    pub apply: Box<dyn Fn(&serde_json::Value) -> Result<(), crate::domain::config::ConfigError> + Send + Sync>,
}

/// Descriptor an [`Activity`] fills in, once, to tell the orchestrator what
/// it needs. Collected by `Orchestrator::add_activity` before the activity is
/// erased into a `dyn Activity` trait object.
#[derive(Default)]
pub struct Dependencies {
    pub(crate) collaborators: Vec<CollaboratorBinding>,
    pub(crate) activity_refs: Vec<ActivityRefBinding>,
    pub(crate) anonymous_refs: Vec<AnonymousRefBinding>,
    pub(crate) configs: Vec<ConfigBinding>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field satisfied by a singleton ([`crate::application::orchestrator::Orchestrator::inject`])
    /// or a per-activity factory ([`crate::application::orchestrator::Orchestrator::provide`]) of type `T`.
    /// Resolution tries, in order: factory, then singleton; if `T` happens to
    /// be a registered *activity*'s concrete type this is rejected as
    /// `BadDependencyType` (`T` was wired as a graph node, not a value — use
    /// [`Self::activity_ref`] instead).
    pub fn collaborator<T, F>(&mut self, setter: F)
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        self.collaborators.push(CollaboratorBinding {
            type_id: TypeId::of::<T>(),
            type_name,
            apply: Box::new(move |any| {
                any.downcast::<T>()
                    .map(|v| setter(v))
                    .map_err(|_| DependencyBindError::TypeMismatch { type_name })
            }),
        });
    }

    /// Declare a named, readable dependency edge on another registered activity of type `T`.
    pub fn activity_ref<T, F>(&mut self, setter: F)
    where
        T: Activity,
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        self.activity_refs.push(ActivityRefBinding {
            type_id: TypeId::of::<T>(),
            type_name,
            apply: Box::new(move |any| {
                any.downcast::<T>()
                    .map(|v| setter(v))
                    .map_err(|_| DependencyBindError::TypeMismatch { type_name })
            }),
        });
    }

    /// Declare an ordering-only dependency edge on another registered activity of type `T`.
    pub fn anonymous_ref<T: Activity>(&mut self) {
        self.anonymous_refs.push(AnonymousRefBinding {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        });
    }

    /// Declare a field bound by dotted configuration path.
    pub fn config<T, F>(&mut self, path: impl Into<String>, setter: F)
    where
        T: serde::de::DeserializeOwned + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        self.configs.push(ConfigBinding {
            path: path.into(),
            type_name,
            apply: Box::new(move |value| {
                let parsed: T = crate::domain::config::coerce(value, type_name)?;
                setter(parsed);
                Ok(())
            }),
        });
    }
}

// ============================================================================
// The Activity trait
// ============================================================================

/// A stateful unit of work.
///
/// `identity` must be stable for the activity's lifetime and unique within
/// one orchestrator (`AddActivity` rejects a second instance sharing an
/// identity). `dependencies` is called once per activity, right after it is
/// added, with `self` still behind a concrete `Arc<Self>` so its closures can
/// capture `Arc::clone(self)` and reach back into its own `Slot` fields —
/// this is what stands in for the source system's field-tag reflection.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    fn identity(&self) -> ActivityIdentity;

    /// Default: no injected fields, no dependency edges.
    fn dependencies(self: &Arc<Self>) -> Dependencies
    where
        Self: Sized,
    {
        Dependencies::new()
    }

    /// Validate and finish wiring. Called once per activity, in topological
    /// order, only after every activity's injection has completed. Must be
    /// cheap and must not observe other activities' *runtime* state (reading
    /// an `ActivityRef` here is fine — the pointee is fully injected too, but
    /// has not executed yet).
    async fn init(&self) -> Result<(), ActivityError>;

    /// Do the work. Runs only after every dependency edge target has
    /// completed successfully. Must honor `ctx.cancelled()` on every blocking
    /// call and return promptly once it resolves.
    async fn execute(&self, ctx: ExecutionContext) -> Result<(), ActivityError>;
}
