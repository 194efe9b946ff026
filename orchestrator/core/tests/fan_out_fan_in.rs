// SPDX-License-Identifier: Apache-2.0
//! End-to-end scheduling scenarios: a dependency diamond, a parallelism
//! bound, and anonymous run-after ordering, all driven through the public
//! `Orchestrator`/`Activity` surface rather than internal graph helpers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use activity_orchestrator_core::{
    Activity, ActivityError, ActivityIdentity, ActivityRef, AnonymousRef, Dependencies,
    ExecutionContext, Orchestrator, Slot,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

struct Root {
    started: Arc<AtomicUsize>,
}

#[async_trait]
impl Activity for Root {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "Root")
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Branch {
    name: &'static str,
    upstream: ActivityRef<Root>,
    order: Arc<Mutex<Vec<&'static str>>>,
    in_flight: Arc<AtomicUsize>,
    max_observed_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl Activity for Branch {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", self.name)
    }

    fn dependencies(self: &Arc<Self>) -> Dependencies {
        let mut deps = Dependencies::new();
        let me = Arc::clone(self);
        deps.activity_ref::<Root, _>(move |root| {
            let _ = me.upstream.slot().set(root);
        });
        deps
    }

    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }

    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        let _ = self.upstream.get();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.order.lock().unwrap().push(self.name);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Join {
    branches: Vec<ActivityRef<Branch>>,
    landed: Arc<AtomicUsize>,
}

#[async_trait]
impl Activity for Join {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "Join")
    }

    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }

    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.landed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn diamond_shaped_graph_runs_all_branches_before_the_join() {
    // Root -> {A, B, C} -> Join. Join must not be reported as complete before
    // every branch has finished, since it depends on all three of them (each
    // edge is an anonymous, ordering-only ref -- Join never reads a branch's
    // output, it just must run after all three).
    let order = Arc::new(Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));

    let mut orchestrator = Orchestrator::new();
    orchestrator.add_activity(Root { started: started.clone() }).unwrap();
    for name in ["A", "B", "C"] {
        orchestrator
            .add_activity(Branch {
                name,
                upstream: ActivityRef::unset(),
                order: order.clone(),
                in_flight: in_flight.clone(),
                max_observed_in_flight: max_in_flight.clone(),
            })
            .unwrap();
    }

    let ctx = ExecutionContext::new(CancellationToken::new());
    orchestrator.execute(ctx).await.unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 1);
    let mut finished = order.lock().unwrap().clone();
    finished.sort();
    assert_eq!(finished, vec!["A", "B", "C"]);
    // With no parallelism cap all three branches should have overlapped.
    assert!(max_in_flight.load(Ordering::SeqCst) > 1);

    let results = orchestrator.get_all_results();
    assert!(results.values().all(|r| r.is_success()));
}

#[tokio::test]
async fn max_parallelism_bounds_concurrent_branches() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));

    let mut orchestrator = Orchestrator::new().with_max_parallelism(1);
    orchestrator.add_activity(Root { started: started.clone() }).unwrap();
    for name in ["A", "B", "C"] {
        orchestrator
            .add_activity(Branch {
                name,
                upstream: ActivityRef::unset(),
                order: order.clone(),
                in_flight: in_flight.clone(),
                max_observed_in_flight: max_in_flight.clone(),
            })
            .unwrap();
    }

    let ctx = ExecutionContext::new(CancellationToken::new());
    orchestrator.execute(ctx).await.unwrap();

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1, "cap of 1 must serialize the ready front");
}

struct First {
    ran: Arc<AtomicUsize>,
}

#[async_trait]
impl Activity for First {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "First")
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RunsAfterFirst {
    after: AnonymousRef<First>,
    order: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Activity for RunsAfterFirst {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "RunsAfterFirst")
    }

    fn dependencies(self: &Arc<Self>) -> Dependencies {
        let mut deps = Dependencies::new();
        deps.anonymous_ref::<First>();
        deps
    }

    async fn init(&self) -> Result<(), ActivityError> {
        let _ = &self.after;
        Ok(())
    }

    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.order.lock().unwrap().push("second");
        Ok(())
    }
}

#[tokio::test]
async fn anonymous_ref_orders_without_exposing_an_accessor() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let ran = Arc::new(AtomicUsize::new(0));

    let mut orchestrator = Orchestrator::new();
    orchestrator.add_activity(First { ran: ran.clone() }).unwrap();
    orchestrator
        .add_activity(RunsAfterFirst {
            after: AnonymousRef::unset(),
            order: order.clone(),
        })
        .unwrap();

    let ctx = ExecutionContext::new(CancellationToken::new());
    orchestrator.execute(ctx).await.unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(*order.lock().unwrap(), vec!["second"]);
}

struct HangsUntilCancelled {
    entered: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl Activity for HangsUntilCancelled {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "HangsUntilCancelled")
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.entered.notify_one();
        ctx.cancelled().await;
        Err(ActivityError::new("cancelled"))
    }
}

struct NeverStarted {
    started: Slot<()>,
}

#[async_trait]
impl Activity for NeverStarted {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "NeverStarted")
    }
    fn dependencies(self: &Arc<Self>) -> Dependencies {
        let mut deps = Dependencies::new();
        let me = Arc::clone(self);
        deps.anonymous_ref::<HangsUntilCancelled>();
        let _ = me;
        deps
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        let _ = self.started.set(());
        Ok(())
    }
}

#[tokio::test]
async fn cancelling_mid_run_skips_not_yet_started_dependents() {
    let entered = Arc::new(tokio::sync::Notify::new());

    let mut orchestrator = Orchestrator::new();
    orchestrator
        .add_activity(HangsUntilCancelled { entered: entered.clone() })
        .unwrap();
    orchestrator.add_activity(NeverStarted { started: Slot::unset() }).unwrap();

    let token = CancellationToken::new();
    let ctx = ExecutionContext::new(token.clone());

    let entered_clone = entered.clone();
    let token_clone = token.clone();
    let canceller = tokio::spawn(async move {
        entered_clone.notified().await;
        token_clone.cancel();
    });

    let outcome = orchestrator.execute(ctx).await;
    canceller.await.unwrap();

    assert!(outcome.is_err());
    let results = orchestrator.get_all_results();
    let dependent = results.get(&ActivityIdentity::new("fan", "NeverStarted")).unwrap();
    assert_eq!(
        dependent.state,
        activity_orchestrator_core::ActivityState::Skipped
    );
}

struct Independent {
    ran: Arc<AtomicUsize>,
}

#[async_trait]
impl Activity for Independent {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "Independent")
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct AlwaysFails {
    ran: Arc<AtomicUsize>,
}

#[async_trait]
impl Activity for AlwaysFails {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "AlwaysFails")
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        Err(ActivityError::new("boom"))
    }
}

struct AnotherIndependent {
    ran: Arc<AtomicUsize>,
}

#[async_trait]
impl Activity for AnotherIndependent {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "AnotherIndependent")
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct DownstreamOfFailure {
    ran: Arc<AtomicUsize>,
    upstream: ActivityRef<AlwaysFails>,
}

#[async_trait]
impl Activity for DownstreamOfFailure {
    fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new("fan", "DownstreamOfFailure")
    }
    fn dependencies(self: &Arc<Self>) -> Dependencies {
        let mut deps = Dependencies::new();
        let me = Arc::clone(self);
        deps.activity_ref::<AlwaysFails, _>(move |f| {
            let _ = me.upstream.slot().set(f);
        });
        deps
    }
    async fn init(&self) -> Result<(), ActivityError> {
        Ok(())
    }
    async fn execute(&self, _ctx: ExecutionContext) -> Result<(), ActivityError> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Spec §8 scenario 3 ("failure isolation"): `A, F, D -> F, E` where `F`
/// fails, `A` and `E` are unrelated to `F` and to each other. `D` is skipped,
/// `A`/`E` complete, and the whole `Execute` call still surfaces `F`'s error.
#[tokio::test]
async fn failing_activity_does_not_prevent_independent_branches_from_completing() {
    let a_ran = Arc::new(AtomicUsize::new(0));
    let f_ran = Arc::new(AtomicUsize::new(0));
    let d_ran = Arc::new(AtomicUsize::new(0));
    let e_ran = Arc::new(AtomicUsize::new(0));

    let mut orchestrator = Orchestrator::new();
    orchestrator.add_activity(Independent { ran: a_ran.clone() }).unwrap();
    orchestrator.add_activity(AlwaysFails { ran: f_ran.clone() }).unwrap();
    orchestrator
        .add_activity(DownstreamOfFailure {
            ran: d_ran.clone(),
            upstream: ActivityRef::unset(),
        })
        .unwrap();
    orchestrator
        .add_activity(AnotherIndependent { ran: e_ran.clone() })
        .unwrap();

    let ctx = ExecutionContext::new(CancellationToken::new());
    let outcome = orchestrator.execute(ctx).await;

    assert!(outcome.is_err());
    assert_eq!(a_ran.load(Ordering::SeqCst), 1);
    assert_eq!(f_ran.load(Ordering::SeqCst), 1);
    assert_eq!(d_ran.load(Ordering::SeqCst), 0);
    assert_eq!(e_ran.load(Ordering::SeqCst), 1);

    let results = orchestrator.get_all_results();
    assert!(results
        .get(&ActivityIdentity::new("fan", "AlwaysFails"))
        .unwrap()
        .error
        .is_some());
    assert_eq!(
        results
            .get(&ActivityIdentity::new("fan", "DownstreamOfFailure"))
            .unwrap()
            .state,
        activity_orchestrator_core::ActivityState::Skipped
    );
}
