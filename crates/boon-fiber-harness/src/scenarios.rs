//! Reusable component programs for tests and benchmarks.
//!
//! Each builder returns the root element plus handles standing in for the
//! event handlers a real host would bind.

use crate::test_harness::Probe;
use boon_fiber::{
    Cleanup, Component, Context, Deps, Dispatcher, Element, StateSetter, Transition,
    UnhandledAction, Value, View,
};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Reducer accepting only `{ "type": "inc" }`.
pub fn counter_reducer(state: &Value, action: &Value) -> Result<Value, UnhandledAction> {
    match action.get("type").as_text() {
        Some("inc") => Ok(Value::Int(state.as_int().unwrap_or(0) + 1)),
        _ => Err(UnhandledAction::new(action)),
    }
}

pub fn inc_action() -> Value {
    Value::object([("type", Value::from("inc"))])
}

/// Shared run/cleanup counters for effects.
#[derive(Clone, Debug, Default)]
pub struct EffectTally {
    runs: Rc<Cell<u64>>,
    cleanups: Rc<Cell<u64>>,
}

impl EffectTally {
    pub fn runs(&self) -> u64 {
        self.runs.get()
    }

    pub fn cleanups(&self) -> u64 {
        self.cleanups.get()
    }

    fn effect(&self) -> anyhow::Result<Option<Cleanup>> {
        self.runs.set(self.runs.get() + 1);
        let cleanups = self.cleanups.clone();
        Ok(Some(Cleanup::new(move || {
            cleanups.set(cleanups.get() + 1);
            Ok(())
        })))
    }
}

struct AppControls {
    dispatch: Dispatcher,
    set_total: StateSetter,
    transition: Transition,
}

/// Counter with a transition-driven keyed list.
///
/// `App` holds a reducer count starting at 1 and a `total` starting at the
/// given value. It renders `total` keyed `Child` rows (key and count are
/// `total - index`), each wrapping a `GrandChild` whose effect runs after
/// every commit that rendered it, and a single keyed `Span` leaf.
pub struct CounterApp {
    pub root: Element,
    pub effects: EffectTally,
    controls: Rc<RefCell<Option<AppControls>>>,
}

impl CounterApp {
    /// The button handler: `inc` on the synchronous lane, `total += 100`
    /// inside a transition. Returns `false` before the app is mounted.
    pub fn click(&self) -> bool {
        let controls = self.controls.borrow();
        let Some(controls) = controls.as_ref() else {
            return false;
        };
        controls.dispatch.dispatch(inc_action());
        controls.transition.start(|| {
            controls
                .set_total
                .update(|total| Value::Int(total.as_int().unwrap_or(0) + 100));
        });
        true
    }

    pub fn dispatch(&self, action: Value) -> bool {
        match self.controls.borrow().as_ref() {
            Some(controls) => {
                controls.dispatch.dispatch(action);
                true
            }
            None => false,
        }
    }
}

pub fn counter_transition_app(total: i64) -> CounterApp {
    let effects = EffectTally::default();
    let controls: Rc<RefCell<Option<AppControls>>> = Rc::new(RefCell::new(None));

    let span = Component::new("Span", |_, props| Ok(View::new(props.get("count"))));

    let tally = effects.clone();
    let grand_child = Component::new("GrandChild", move |cx, props| {
        let tally = tally.clone();
        cx.use_effect(Deps::Always, move || tally.effect())?;
        Ok(View::empty().child(span.element(props.clone()).with_key(0)))
    });

    let child = Component::new("Child", move |_, props| {
        Ok(View::empty().child(grand_child.element(props.clone())))
    });

    let registry = controls.clone();
    let app = Component::new("App", move |cx, _| {
        let (count, dispatch) = cx.use_reducer(counter_reducer, 1)?;
        let (pending, transition) = cx.use_transition();
        let (total, set_total) = cx.use_state(total)?;
        *registry.borrow_mut() = Some(AppControls {
            dispatch,
            set_total,
            transition,
        });

        let total = total.as_int().unwrap_or(0);
        let rows = (0..total).map(|index| {
            let count = total - index;
            child
                .element(Value::object([("count", Value::Int(count))]))
                .with_key(count)
        });
        let value = Value::object([
            ("count", count),
            ("total", Value::Int(total)),
            ("pending", Value::Bool(pending)),
        ]);
        Ok(View::new(value).children(rows))
    });

    CounterApp {
        root: app.element(()),
        effects,
        controls,
    }
}

/// A list of independent keyed counters whose order lives in the list's state.
pub struct KeyedCounters {
    pub root: Element,
    setters: Rc<RefCell<FxHashMap<i64, StateSetter>>>,
    order: Rc<RefCell<Option<StateSetter>>>,
    renders: Rc<RefCell<FxHashMap<i64, usize>>>,
}

impl KeyedCounters {
    pub fn increment(&self, id: i64) -> bool {
        match self.setters.borrow().get(&id) {
            Some(setter) => {
                setter.update(|count| Value::Int(count.as_int().unwrap_or(0) + 1));
                true
            }
            None => false,
        }
    }

    /// Replace the rendered ids (reorder, drop or re-add counters).
    pub fn set_order(&self, ids: &[i64]) -> bool {
        match self.order.borrow().as_ref() {
            Some(setter) => {
                setter.set(Value::list(ids.iter().map(|&id| Value::Int(id))));
                true
            }
            None => false,
        }
    }

    /// Times counter `id` executed its render function.
    pub fn renders(&self, id: i64) -> usize {
        self.renders.borrow().get(&id).copied().unwrap_or(0)
    }

    pub fn total_renders(&self) -> usize {
        self.renders.borrow().values().sum()
    }
}

/// `CounterList` rendering `n` keyed `Counter`s with ids `1..=n`.
pub fn keyed_counters(n: i64) -> KeyedCounters {
    let setters: Rc<RefCell<FxHashMap<i64, StateSetter>>> = Rc::default();
    let order: Rc<RefCell<Option<StateSetter>>> = Rc::default();
    let renders: Rc<RefCell<FxHashMap<i64, usize>>> = Rc::default();

    let (registry, tally) = (setters.clone(), renders.clone());
    let counter = Component::new("Counter", move |cx, props| {
        let id = props.get("id").as_int().unwrap_or(0);
        let (count, set_count) = cx.use_state(0)?;
        registry.borrow_mut().insert(id, set_count);
        *tally.borrow_mut().entry(id).or_default() += 1;
        Ok(View::new(count))
    });

    let order_slot = order.clone();
    let list = Component::new("CounterList", move |cx, _| {
        let (ids, set_ids) = cx.use_state(Value::list((1..=n).map(Value::Int)))?;
        *order_slot.borrow_mut() = Some(set_ids);
        let rows = ids.as_list().unwrap_or(&[]).iter().map(|id| {
            let id = id.as_int().unwrap_or(0);
            counter
                .element(Value::object([("id", Value::Int(id))]))
                .with_key(id)
        });
        Ok(View::new(ids.as_list().map_or(0, <[Value]>::len)).children(rows))
    });

    KeyedCounters {
        root: list.element(()),
        setters,
        order,
        renders,
    }
}

/// `Toggle` conditionally mounting `A` with a nested `B`, both with mount-once
/// effects that log to `probe`.
pub struct ToggledEffects {
    pub root: Element,
    pub probe: Probe,
    toggle: Rc<RefCell<Option<StateSetter>>>,
}

impl ToggledEffects {
    pub fn toggle(&self) -> bool {
        match self.toggle.borrow().as_ref() {
            Some(setter) => {
                setter.update(|shown| Value::Bool(!shown.as_bool().unwrap_or(false)));
                true
            }
            None => false,
        }
    }
}

pub fn toggled_effects(shown: bool) -> ToggledEffects {
    let probe = Probe::new();
    let toggle: Rc<RefCell<Option<StateSetter>>> = Rc::default();

    let logging = |name: &'static str, probe: &Probe| {
        let probe = probe.clone();
        move || -> anyhow::Result<Option<Cleanup>> {
            probe.push(format!("effect {}", name));
            let probe = probe.clone();
            Ok(Some(Cleanup::new(move || {
                probe.push(format!("cleanup {}", name));
                Ok(())
            })))
        }
    };

    let b_probe = probe.clone();
    let b = Component::new("B", move |cx, _| {
        cx.use_effect(Deps::Once, logging("B", &b_probe))?;
        Ok(View::new("b"))
    });

    let a_probe = probe.clone();
    let a = Component::new("A", move |cx, _| {
        cx.use_effect(Deps::Once, logging("A", &a_probe))?;
        Ok(View::new("a").child(b.element(())))
    });

    let setter_slot = toggle.clone();
    let root = Component::new("Toggle", move |cx, _| {
        let (shown, set_shown) = cx.use_state(shown)?;
        *setter_slot.borrow_mut() = Some(set_shown);
        let shown = shown.as_bool().unwrap_or(false);
        let view = View::new(shown);
        Ok(if shown { view.child(a.element(())) } else { view })
    });

    ToggledEffects {
        root: root.element(()),
        probe,
        toggle,
    }
}

#[derive(Default)]
struct ThemeControls {
    set_theme: Option<StateSetter>,
    bump_sibling: Option<StateSetter>,
    bump_consumer: Option<StateSetter>,
}

/// `Root` provides a `Theme` value held in its state to a memoized `Middle`
/// wrapping a `Consumer`, next to a stateful `Sibling`. `probe` records
/// `render <Name>` on every render function execution.
pub struct MemoContext {
    pub root: Element,
    pub probe: Probe,
    controls: Rc<RefCell<ThemeControls>>,
}

impl MemoContext {
    pub fn set_theme(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        self.with(|c| c.set_theme.as_ref(), |setter| setter.set(value))
    }

    pub fn bump_sibling(&self) -> bool {
        self.with(|c| c.bump_sibling.as_ref(), increment)
    }

    pub fn bump_consumer(&self) -> bool {
        self.with(|c| c.bump_consumer.as_ref(), increment)
    }

    fn with(
        &self,
        select: impl FnOnce(&ThemeControls) -> Option<&StateSetter>,
        apply: impl FnOnce(&StateSetter),
    ) -> bool {
        let controls = self.controls.borrow();
        match select(&*controls) {
            Some(setter) => {
                apply(setter);
                true
            }
            None => false,
        }
    }
}

fn increment(setter: &StateSetter) {
    setter.update(|n| Value::Int(n.as_int().unwrap_or(0) + 1));
}

pub fn memo_context(initial: impl Into<Value>) -> MemoContext {
    let initial = initial.into();
    let probe = Probe::new();
    let theme = Context::new("Theme", Value::Null);
    let controls: Rc<RefCell<ThemeControls>> = Rc::default();

    let (log, slots, consumer_theme) = (probe.clone(), controls.clone(), theme.clone());
    let consumer = Component::new("Consumer", move |cx, _| {
        log.push("render Consumer");
        let (clicks, set_clicks) = cx.use_state(0)?;
        slots.borrow_mut().bump_consumer = Some(set_clicks);
        let value = cx.use_context(&consumer_theme);
        Ok(View::new(Value::object([("theme", value), ("clicks", clicks)])))
    });

    let log = probe.clone();
    let middle = Component::new("Middle", move |_, _| {
        log.push("render Middle");
        Ok(View::empty().child(consumer.element(())))
    })
    .memo();

    let (log, slots) = (probe.clone(), controls.clone());
    let sibling = Component::new("Sibling", move |cx, _| {
        log.push("render Sibling");
        let (count, set_count) = cx.use_state(0)?;
        slots.borrow_mut().bump_sibling = Some(set_count);
        Ok(View::new(count))
    });

    let (log, slots) = (probe.clone(), controls.clone());
    let root = Component::new("Root", move |cx, _| {
        log.push("render Root");
        let (value, set_theme) = cx.use_state(initial.clone())?;
        slots.borrow_mut().set_theme = Some(set_theme);
        Ok(View::empty().child(theme.provide(value, [middle.element(()), sibling.element(())])))
    });

    MemoContext {
        root: root.element(()),
        probe,
        controls,
    }
}
