//! Memoized components skip renders while context changes still reach
//! their descendants.

use boon_fiber_harness::scenarios::memo_context;
use boon_fiber_harness::test_harness::{Probe, TestRuntime};
use boon_fiber::{Component, Context, Lane, Mutation, Value, View};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const CONSUMER: &str = "Root/Theme/Middle/Consumer";

#[test]
fn mount_renders_everything_once() {
    init();
    let app = memo_context("light");
    let mut rt = TestRuntime::new();
    rt.mount(app.root.clone());

    assert_eq!(
        app.probe.take(),
        vec!["render Root", "render Middle", "render Consumer", "render Sibling"]
    );
    rt.assert_value(CONSUMER, Value::object([("theme", Value::from("light")), ("clicks", Value::Int(0))]));
    rt.assert_value("Root/Theme", "light");
}

#[test]
fn context_change_reaches_consumer_through_memoized_parent() {
    init();
    let app = memo_context("light");
    let mut rt = TestRuntime::new();
    rt.mount(app.root.clone());
    app.probe.take();

    app.set_theme("dark");
    rt.flush();

    let renders = app.probe.take();
    assert_eq!(renders, vec!["render Root", "render Consumer", "render Sibling"]);
    assert_eq!(rt.read(CONSUMER).get("theme"), Value::from("dark"));
}

#[test]
fn sibling_update_does_not_touch_consumer() {
    init();
    let app = memo_context("111");
    let mut rt = TestRuntime::new();
    rt.mount(app.root.clone());
    app.probe.take();

    app.bump_sibling();
    app.bump_sibling();
    rt.flush();

    assert_eq!(app.probe.take(), vec!["render Sibling"]);
    rt.assert_value("Root/Theme/Sibling", 2);
    assert_eq!(rt.read(CONSUMER).get("theme"), Value::from("111"));
}

#[test]
fn consumer_state_update_renders_only_consumer() {
    init();
    let app = memo_context("light");
    let mut rt = TestRuntime::new();
    rt.mount(app.root.clone());
    app.probe.take();

    app.bump_consumer();
    rt.flush();

    assert_eq!(app.probe.take(), vec!["render Consumer"]);
    rt.assert_value(CONSUMER, Value::object([("theme", Value::from("light")), ("clicks", Value::Int(1))]));
}

#[test]
fn unchanged_provider_value_skips_memoized_subtree() {
    init();
    let app = memo_context("light");
    let mut rt = TestRuntime::new();
    rt.mount(app.root.clone());
    app.probe.take();

    app.set_theme("light");
    rt.flush();

    assert_eq!(app.probe.take(), vec!["render Root", "render Sibling"]);
}

#[test]
fn nested_providers_shadow_outer_values() {
    init();
    let theme = Context::new("Theme", "default");
    let reader_theme = theme.clone();
    let reader = Component::new("Reader", move |cx, _| Ok(View::new(cx.use_context(&reader_theme))));
    let root = Component::new("Root", move |_, _| {
        Ok(View::empty().children([
            reader.element(()),
            theme.provide(
                "outer",
                [reader.element(()), theme.provide("inner", [reader.element(())])],
            ),
        ]))
    });

    let mut rt = TestRuntime::new();
    rt.mount(root.element(()));

    rt.assert_value("Root/Reader", "default");
    rt.assert_value("Root/Theme/Reader", "outer");
    rt.assert_value("Root/Theme/Theme/Reader", "inner");
}

#[test]
fn custom_comparator_controls_memo_bailout() {
    init();
    let probe = Probe::new();
    let log = probe.clone();
    let row = Component::new("Row", move |_, props| {
        log.push("render Row");
        Ok(View::new(props.get("label")))
    })
    .memo_with(|previous, next| previous.get("id") == next.get("id"));

    let table = Component::new("Table", move |cx, _| {
        let (label, _) = cx.use_state("first")?;
        Ok(View::empty().child(row.element(Value::object([("id", Value::Int(1)), ("label", label)]))))
    });

    let mut rt = TestRuntime::new();
    let root = rt.mount(table.element(()));
    probe.take();

    rt.runtime()
        .enqueue_update(root, 0, Mutation::Replace(Value::from("second")), Lane::Sync);
    rt.flush();

    // same id: the row keeps its committed props and output
    assert!(probe.take().is_empty());
    rt.assert_value("Table/Row", "first");
    let row_id = rt.runtime().children(root)[0];
    assert_eq!(rt.runtime().props(row_id).unwrap().get("label"), Value::from("first"));
}

#[test]
fn memoized_child_with_equal_props_skips_render() {
    init();
    let probe = Probe::new();
    let log = probe.clone();
    let label = Component::new("Label", move |_, props| {
        log.push("render Label");
        Ok(View::new(props.get("text")))
    })
    .memo();

    let page = Component::new("Page", move |cx, _| {
        let (text, _) = cx.use_state("hello")?;
        let (_, _) = cx.use_state(0)?;
        Ok(View::empty().child(label.element(Value::object([("text", text)]))))
    });

    let mut rt = TestRuntime::new();
    let root = rt.mount(page.element(()));
    assert_eq!(probe.take(), vec!["render Label"]);

    rt.runtime()
        .enqueue_update(root, 1, Mutation::Replace(Value::Int(7)), Lane::Sync);
    rt.flush();
    assert!(probe.take().is_empty());

    rt.runtime()
        .enqueue_update(root, 0, Mutation::Replace(Value::from("bye")), Lane::Sync);
    rt.flush();
    assert_eq!(probe.take(), vec!["render Label"]);
    rt.assert_value("Page/Label", "bye");
}
