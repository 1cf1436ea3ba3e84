//! Synchronous and transition lanes: priority, time slicing, interruption.

use boon_fiber_harness::scenarios::counter_transition_app;
use boon_fiber_harness::test_harness::TestRuntime;
use boon_fiber::{Lane, Mutation, RuntimeConfig, Value, WorkStatus};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn field(rt: &TestRuntime, name: &str) -> Value {
    rt.read("App").get(name)
}

#[test]
fn app_initializes() {
    init();
    let app = counter_transition_app(3);
    let mut rt = TestRuntime::new();
    let root = rt.mount(app.root.clone());

    assert_eq!(field(&rt, "count"), Value::Int(1));
    assert_eq!(field(&rt, "total"), Value::Int(3));
    assert_eq!(field(&rt, "pending"), Value::Bool(false));
    assert_eq!(rt.runtime().children(root).len(), 3);
    rt.assert_value("App/Child#3/GrandChild/Span#0", 3);
    rt.assert_value("App/Child[2]/GrandChild/Span", 1);
    assert_eq!(app.effects.runs(), 3);
}

#[test]
fn click_commits_sync_lane_before_transition() {
    init();
    let app = counter_transition_app(2);
    let mut rt = TestRuntime::new();
    rt.mount(app.root.clone());
    rt.host().clear();

    assert!(app.click());
    let report = rt.flush();

    assert_eq!(report.commits, 2);
    let commits = rt.host().commits();
    assert_eq!(commits[0].lane, Lane::Sync);
    assert_eq!(commits[1].lane, Lane::Transition);

    // the sync commit shows the new count with the transition still pending
    let first = &commits[0].trees[0];
    assert_eq!(first.value.get("count"), Value::Int(2));
    assert_eq!(first.value.get("total"), Value::Int(2));
    assert_eq!(first.value.get("pending"), Value::Bool(true));

    assert_eq!(field(&rt, "count"), Value::Int(2));
    assert_eq!(field(&rt, "total"), Value::Int(102));
    assert_eq!(field(&rt, "pending"), Value::Bool(false));
}

#[test]
fn time_sliced_transition_is_interrupted_by_sync_click() {
    init();
    let app = counter_transition_app(2000);
    let mut rt = TestRuntime::new();
    let root = rt.mount(app.root.clone());

    app.click();
    let report = rt.work(10);
    assert_eq!(report.status, WorkStatus::Yielded);
    assert_eq!(report.commits, 1);
    assert_eq!(field(&rt, "count"), Value::Int(2));
    assert_eq!(field(&rt, "total"), Value::Int(2000));
    assert_eq!(field(&rt, "pending"), Value::Bool(true));
    assert!(rt.runtime().has_pending_work());

    // second click while the first transition is half rendered
    app.click();
    let report = rt.work(10);
    assert_eq!(report.status, WorkStatus::Yielded);
    assert_eq!(report.interrupted, 1);
    assert_eq!(report.commits, 1);
    assert_eq!(field(&rt, "count"), Value::Int(3));
    assert_eq!(field(&rt, "total"), Value::Int(2000));

    let report = rt.flush();
    assert_eq!(report.status, WorkStatus::Idle);
    assert_eq!(report.commits, 1);
    assert_eq!(report.interrupted, 0);

    assert_eq!(field(&rt, "count"), Value::Int(3));
    assert_eq!(field(&rt, "total"), Value::Int(2200));
    assert_eq!(field(&rt, "pending"), Value::Bool(false));
    assert_eq!(rt.runtime().children(root).len(), 2200);
    rt.assert_value("App/Child#2200/GrandChild/Span", 2200);
    assert_eq!(app.effects.runs() - app.effects.cleanups(), 2200);
}

#[test]
fn newer_transition_update_restarts_suspended_pass() {
    init();
    let app = counter_transition_app(50);
    let mut rt = TestRuntime::new();
    let root = rt.mount(app.root.clone());

    rt.runtime().enqueue_update(
        root,
        1,
        Mutation::apply(|total| Value::Int(total.as_int().unwrap_or(0) + 10)),
        Lane::Transition,
    );
    let report = rt.work(5);
    assert_eq!(report.status, WorkStatus::Yielded);
    assert_eq!(report.commits, 0);

    rt.runtime().enqueue_update(
        root,
        1,
        Mutation::apply(|total| Value::Int(total.as_int().unwrap_or(0) + 10)),
        Lane::Transition,
    );
    let report = rt.flush();
    assert_eq!(report.interrupted, 1);
    assert_eq!(report.commits, 1);
    assert_eq!(field(&rt, "total"), Value::Int(70));
}

#[test]
fn zero_budget_still_commits_sync_work() {
    init();
    let app = counter_transition_app(1);
    let mut rt = TestRuntime::new();
    rt.mount(app.root.clone());

    app.click();
    let report = rt.work(0);
    assert_eq!(report.status, WorkStatus::Yielded);
    assert_eq!(report.commits, 1);
    assert_eq!(field(&rt, "count"), Value::Int(2));
    assert_eq!(field(&rt, "total"), Value::Int(1));

    let report = rt.work(0);
    assert_eq!(report.commits, 0);
    assert_eq!(field(&rt, "total"), Value::Int(1));

    rt.flush();
    assert_eq!(field(&rt, "total"), Value::Int(101));
}

#[test]
fn work_slice_uses_configured_budget() {
    init();
    let app = counter_transition_app(100);
    let mut rt = TestRuntime::with_config(RuntimeConfig::default().with_default_work_budget(1000));
    let root = rt.mount(app.root.clone());

    rt.runtime()
        .enqueue_update(root, 1, Mutation::Replace(Value::Int(150)), Lane::Transition);
    let report = rt.runtime_mut().work_slice().unwrap();

    assert_eq!(report.status, WorkStatus::Idle);
    assert_eq!(report.commits, 1);
    assert_eq!(field(&rt, "total"), Value::Int(150));
}

#[test]
fn transition_scope_routes_setter_calls() {
    init();
    let app = counter_transition_app(1);
    let mut rt = TestRuntime::new();
    let root = rt.mount(app.root.clone());

    let queue = rt.runtime().updates();
    rt.runtime().start_transition(|| {
        queue.enqueue(root, 1, Mutation::Replace(Value::Int(5)), queue.current_lane());
    });
    assert!(queue.has_pending(Lane::Transition));
    assert!(!queue.has_pending(Lane::Sync));

    rt.flush();
    assert_eq!(field(&rt, "total"), Value::Int(5));
    assert_eq!(rt.host().last_commit().unwrap().lane, Lane::Transition);
}

#[test]
fn suspended_transition_applies_on_top_of_sync_write() {
    init();
    let app = counter_transition_app(50);
    let mut rt = TestRuntime::new();
    let root = rt.mount(app.root.clone());
    rt.host().clear();

    rt.runtime().enqueue_update(
        root,
        1,
        Mutation::apply(|total| Value::Int(total.as_int().unwrap_or(0) + 1)),
        Lane::Transition,
    );
    let report = rt.work(5);
    assert_eq!(report.status, WorkStatus::Yielded);
    assert_eq!(report.commits, 0);

    rt.runtime()
        .enqueue_update(root, 1, Mutation::Replace(Value::Int(5)), Lane::Sync);
    let report = rt.flush();
    assert_eq!(report.interrupted, 1);
    assert_eq!(report.commits, 2);

    let commits = rt.host().commits();
    assert_eq!(commits[0].lane, Lane::Sync);
    assert_eq!(commits[0].trees[0].value.get("total"), Value::Int(5));
    assert_eq!(commits[1].lane, Lane::Transition);
    assert_eq!(field(&rt, "total"), Value::Int(6));
    assert_eq!(rt.runtime().children(root).len(), 6);
}
