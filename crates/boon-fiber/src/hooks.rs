//! Hook State Store.
//!
//! Each node owns an ordered list of hook slots addressed by declaration
//! order. A render never writes the committed list: `RenderCx` builds a fresh
//! staged list from the committed one plus the lane's queued updates, and the
//! staged list only replaces the committed one when the pass commits.

use crate::address::{ContextId, NodeId};
use crate::context::ContextStack;
use crate::effects::{Cleanup, Deps, StagedEffect};
use crate::element::Context;
use crate::error::{RuntimeError, UnhandledAction};
use crate::lane::{Dispatcher, Lane, Mutation, StateSetter, Transition, UpdateQueue, UpdateTask};
use crate::value::{Value, deps_equal};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookKind {
    State,
    Reducer,
    Memo,
    Ref,
    Effect,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::State => "state",
            HookKind::Reducer => "reducer",
            HookKind::Memo => "memo",
            HookKind::Ref => "ref",
            HookKind::Effect => "effect",
        };
        f.write_str(name)
    }
}

/// Mutable cell whose identity is stable for the node's lifetime.
/// Writes are immediate and never trigger a render.
#[derive(Clone, Debug, Default)]
pub struct RefHandle(Rc<RefCell<Value>>);

impl RefHandle {
    pub fn new(value: Value) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: impl Into<Value>) {
        *self.0.borrow_mut() = value.into();
    }

    pub fn ptr_eq(&self, other: &RefHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum HookSlot {
    State(Value),
    Reducer(Value),
    Memo { value: Value, deps: Vec<Value> },
    Ref(RefHandle),
    Effect(Deps),
}

impl HookSlot {
    pub(crate) fn kind(&self) -> HookKind {
        match self {
            HookSlot::State(_) => HookKind::State,
            HookSlot::Reducer(_) => HookKind::Reducer,
            HookSlot::Memo { .. } => HookKind::Memo,
            HookSlot::Ref(_) => HookKind::Ref,
            HookSlot::Effect(_) => HookKind::Effect,
        }
    }

    /// Observable value of the slot, if it holds one.
    pub(crate) fn value(&self) -> Option<Value> {
        match self {
            HookSlot::State(value) | HookSlot::Reducer(value) => Some(value.clone()),
            HookSlot::Memo { value, .. } => Some(value.clone()),
            HookSlot::Ref(handle) => Some(handle.get()),
            HookSlot::Effect(_) => None,
        }
    }
}

/// What a finished render leaves behind for the commit.
pub(crate) struct RenderOutput {
    pub(crate) hooks: Vec<HookSlot>,
    pub(crate) context_reads: SmallVec<[ContextId; 2]>,
    pub(crate) effects: Vec<StagedEffect>,
}

/// Render context handed to component render functions. It identifies the
/// node being rendered and gives access to its hooks.
pub struct RenderCx<'a> {
    node: NodeId,
    name: &'static str,
    lane: Lane,
    previous: Option<&'a [HookSlot]>,
    hooks: Vec<HookSlot>,
    updates: &'a [UpdateTask],
    queue: &'a UpdateQueue,
    contexts: &'a ContextStack,
    context_reads: SmallVec<[ContextId; 2]>,
    effects: Vec<StagedEffect>,
}

impl<'a> RenderCx<'a> {
    /// `previous` is `None` on the node's first render.
    pub(crate) fn new(
        node: NodeId,
        name: &'static str,
        lane: Lane,
        previous: Option<&'a [HookSlot]>,
        updates: &'a [UpdateTask],
        queue: &'a UpdateQueue,
        contexts: &'a ContextStack,
    ) -> Self {
        Self {
            node,
            name,
            lane,
            previous,
            hooks: Vec::with_capacity(previous.map_or(0, <[HookSlot]>::len)),
            updates,
            queue,
            contexts,
            context_reads: SmallVec::new(),
            effects: Vec::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn component_name(&self) -> &'static str {
        self.name
    }

    /// Lane of the pass this render belongs to.
    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn use_state(&mut self, initial: impl Into<Value>) -> Result<(Value, StateSetter), RuntimeError> {
        let slot = self.hooks.len();
        let base = match self.claim(HookKind::State)? {
            Some(HookSlot::State(value)) => value.clone(),
            _ => initial.into(),
        };
        let value = self.apply_updates(slot, base, None)?;
        self.hooks.push(HookSlot::State(value.clone()));
        let setter = StateSetter {
            node: self.node,
            slot,
            queue: self.queue.clone(),
        };
        Ok((value, setter))
    }

    /// Reducer cell. The reducer passed to the current render processes
    /// the queued actions; returning `Err` aborts the pass.
    pub fn use_reducer(
        &mut self,
        reducer: impl Fn(&Value, &Value) -> Result<Value, UnhandledAction>,
        initial: impl Into<Value>,
    ) -> Result<(Value, Dispatcher), RuntimeError> {
        let slot = self.hooks.len();
        let base = match self.claim(HookKind::Reducer)? {
            Some(HookSlot::Reducer(value)) => value.clone(),
            _ => initial.into(),
        };
        let reducer: &dyn Fn(&Value, &Value) -> Result<Value, UnhandledAction> = &reducer;
        let value = self.apply_updates(slot, base, Some(reducer))?;
        self.hooks.push(HookSlot::Reducer(value.clone()));
        let dispatcher = Dispatcher {
            node: self.node,
            slot,
            queue: self.queue.clone(),
        };
        Ok((value, dispatcher))
    }

    /// Cached value, recomputed only when `deps` differ from the previous
    /// render's deps at this slot.
    pub fn use_memo(&mut self, deps: &[Value], compute: impl FnOnce() -> Value) -> Result<Value, RuntimeError> {
        let cached = match self.claim(HookKind::Memo)? {
            Some(HookSlot::Memo { value, deps: previous }) if deps_equal(previous, deps) => {
                Some((value.clone(), previous.clone()))
            }
            _ => None,
        };
        let (value, deps) = match cached {
            Some(hit) => hit,
            None => (compute(), deps.to_vec()),
        };
        self.hooks.push(HookSlot::Memo {
            value: value.clone(),
            deps,
        });
        Ok(value)
    }

    pub fn use_ref(&mut self, initial: impl Into<Value>) -> Result<RefHandle, RuntimeError> {
        let handle = match self.claim(HookKind::Ref)? {
            Some(HookSlot::Ref(handle)) => handle.clone(),
            _ => RefHandle::new(initial.into()),
        };
        self.hooks.push(HookSlot::Ref(handle.clone()));
        Ok(handle)
    }

    /// Stage an effect for the commit of this render. It only runs if this
    /// is the node's first render or `deps` changed.
    pub fn use_effect(
        &mut self,
        deps: Deps,
        effect: impl FnOnce() -> anyhow::Result<Option<Cleanup>> + 'static,
    ) -> Result<(), RuntimeError> {
        let slot = self.hooks.len();
        let skip = match self.claim(HookKind::Effect)? {
            Some(HookSlot::Effect(previous)) => deps.unchanged_since(previous),
            _ => false,
        };
        if !skip {
            self.effects.push(StagedEffect {
                slot,
                run: Box::new(effect),
            });
        }
        self.hooks.push(HookSlot::Effect(deps));
        Ok(())
    }

    /// Innermost provided value of `context`. Takes no hook slot.
    pub fn use_context(&mut self, context: &Context) -> Value {
        if !self.context_reads.contains(&context.id()) {
            self.context_reads.push(context.id());
        }
        self.contexts.read(context)
    }

    /// Takes no hook slot. `pending` is true while transition work is
    /// queued and this render is not itself part of it.
    pub fn use_transition(&mut self) -> (bool, Transition) {
        let pending = self.lane == Lane::Sync && self.queue.has_pending(Lane::Transition);
        let transition = Transition {
            queue: self.queue.clone(),
        };
        (pending, transition)
    }

    /// Check the declaration sequence was reproduced in full.
    pub(crate) fn finish(self) -> Result<RenderOutput, RuntimeError> {
        if let Some(previous) = self.previous {
            if let Some(missing) = previous.get(self.hooks.len()) {
                return Err(RuntimeError::HookSlotMismatch {
                    node: self.node,
                    slot: self.hooks.len(),
                    expected: Some(missing.kind()),
                    found: None,
                });
            }
        }
        Ok(RenderOutput {
            hooks: self.hooks,
            context_reads: self.context_reads,
            effects: self.effects,
        })
    }

    /// Committed slot at the next position, checked against `kind`.
    fn claim(&self, kind: HookKind) -> Result<Option<&'a HookSlot>, RuntimeError> {
        let slot = self.hooks.len();
        let Some(previous) = self.previous else {
            return Ok(None);
        };
        match previous.get(slot) {
            Some(existing) if existing.kind() == kind => Ok(Some(existing)),
            existing => Err(RuntimeError::HookSlotMismatch {
                node: self.node,
                slot,
                expected: existing.map(HookSlot::kind),
                found: Some(kind),
            }),
        }
    }

    fn apply_updates(
        &self,
        slot: usize,
        mut value: Value,
        reducer: Option<&dyn Fn(&Value, &Value) -> Result<Value, UnhandledAction>>,
    ) -> Result<Value, RuntimeError> {
        for task in self.updates.iter().filter(|task| task.slot == slot) {
            value = match &task.mutation {
                Mutation::Replace(next) => next.clone(),
                Mutation::Apply(f) => f(&value),
                Mutation::Action(action) => match reducer {
                    Some(reducer) => {
                        reducer(&value, action).map_err(|rejected| RuntimeError::UnhandledAction {
                            node: self.node,
                            action: rejected.action,
                        })?
                    }
                    None => action.clone(),
                },
            };
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn node() -> NodeId {
        NodeId {
            index: 7,
            generation: 0,
        }
    }

    fn counter_reducer(state: &Value, action: &Value) -> Result<Value, UnhandledAction> {
        match action.get("type").as_text() {
            Some("inc") => Ok(Value::Int(state.as_int().unwrap_or(0) + 1)),
            _ => Err(UnhandledAction::new(action)),
        }
    }

    fn inc() -> Value {
        Value::object([("type", Value::from("inc"))])
    }

    #[test]
    fn first_render_uses_initial_values() {
        let queue = UpdateQueue::new();
        let contexts = ContextStack::new();
        let mut cx = RenderCx::new(node(), "Counter", Lane::Sync, None, &[], &queue, &contexts);

        let (count, _) = cx.use_state(5).unwrap();
        let (total, _) = cx.use_reducer(counter_reducer, 1).unwrap();
        let handle = cx.use_ref("r").unwrap();

        assert_eq!(count, Value::Int(5));
        assert_eq!(total, Value::Int(1));
        assert_eq!(handle.get().as_text(), Some("r"));
        assert_eq!(cx.finish().unwrap().hooks.len(), 3);
    }

    #[test]
    fn queued_updates_apply_in_order() {
        let queue = UpdateQueue::new();
        let contexts = ContextStack::new();
        queue.enqueue(node(), 0, Mutation::Replace(Value::Int(10)), Lane::Sync);
        queue.enqueue(node(), 0, Mutation::apply(|v| Value::Int(v.as_int().unwrap_or(0) * 2)), Lane::Sync);
        queue.enqueue(node(), 1, Mutation::Action(inc()), Lane::Sync);
        let batch = queue.batch(Lane::Sync);

        let previous = vec![HookSlot::State(Value::Int(1)), HookSlot::Reducer(Value::Int(1))];
        let mut cx = RenderCx::new(
            node(),
            "Counter",
            Lane::Sync,
            Some(previous.as_slice()),
            batch.updates_for(node()),
            &queue,
            &contexts,
        );

        let (count, _) = cx.use_state(0).unwrap();
        let (total, _) = cx.use_reducer(counter_reducer, 0).unwrap();
        assert_eq!(count, Value::Int(20));
        assert_eq!(total, Value::Int(2));
        cx.finish().unwrap();

        // committed slots are untouched until commit
        assert_eq!(previous[0].value(), Some(Value::Int(1)));
    }

    #[test]
    fn reducer_rejection_surfaces_unhandled_action() {
        let queue = UpdateQueue::new();
        let contexts = ContextStack::new();
        let bogus = Value::object([("type", Value::from("nope"))]);
        queue.enqueue(node(), 0, Mutation::Action(bogus.clone()), Lane::Sync);
        let batch = queue.batch(Lane::Sync);
        let previous = vec![HookSlot::Reducer(Value::Int(1))];
        let mut cx = RenderCx::new(
            node(),
            "Counter",
            Lane::Sync,
            Some(previous.as_slice()),
            batch.updates_for(node()),
            &queue,
            &contexts,
        );

        let err = cx.use_reducer(counter_reducer, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnhandledAction);
        assert!(matches!(err, RuntimeError::UnhandledAction { action, .. } if action == bogus));
    }

    #[test]
    fn diverging_declarations_are_rejected() {
        let queue = UpdateQueue::new();
        let contexts = ContextStack::new();
        let previous = vec![HookSlot::State(Value::Int(1)), HookSlot::Effect(Deps::Once)];

        let mut swapped = RenderCx::new(node(), "A", Lane::Sync, Some(previous.as_slice()), &[], &queue, &contexts);
        let err = swapped.use_ref(()).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::HookSlotMismatch {
                slot: 0,
                expected: Some(HookKind::State),
                found: Some(HookKind::Ref),
                ..
            }
        ));

        let mut short = RenderCx::new(node(), "A", Lane::Sync, Some(previous.as_slice()), &[], &queue, &contexts);
        short.use_state(0).unwrap();
        let err = short.finish().err().unwrap();
        assert!(matches!(
            err,
            RuntimeError::HookSlotMismatch {
                slot: 1,
                expected: Some(HookKind::Effect),
                found: None,
                ..
            }
        ));

        let mut long = RenderCx::new(node(), "A", Lane::Sync, Some(previous.as_slice()), &[], &queue, &contexts);
        long.use_state(0).unwrap();
        long.use_effect(Deps::Once, || Ok(None)).unwrap();
        let err = long.use_state(0).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::HookSlotMismatch {
                slot: 2,
                expected: None,
                ..
            }
        ));
    }

    #[test]
    fn memo_recomputes_only_on_changed_deps() {
        let queue = UpdateQueue::new();
        let contexts = ContextStack::new();
        let previous = vec![HookSlot::Memo {
            value: Value::Int(42),
            deps: vec![Value::Int(1)],
        }];

        let mut same = RenderCx::new(node(), "M", Lane::Sync, Some(previous.as_slice()), &[], &queue, &contexts);
        let value = same.use_memo(&[Value::Int(1)], || Value::Int(0)).unwrap();
        assert_eq!(value, Value::Int(42));

        let mut changed = RenderCx::new(node(), "M", Lane::Sync, Some(previous.as_slice()), &[], &queue, &contexts);
        let value = changed.use_memo(&[Value::Int(2)], || Value::Int(0)).unwrap();
        assert_eq!(value, Value::Int(0));
    }

    #[test]
    fn effects_with_unchanged_deps_are_not_staged() {
        let queue = UpdateQueue::new();
        let contexts = ContextStack::new();
        let previous = vec![HookSlot::Effect(Deps::Once), HookSlot::Effect(Deps::Always)];
        let mut cx = RenderCx::new(node(), "E", Lane::Sync, Some(previous.as_slice()), &[], &queue, &contexts);

        cx.use_effect(Deps::Once, || Ok(None)).unwrap();
        cx.use_effect(Deps::Always, || Ok(None)).unwrap();
        let output = cx.finish().unwrap();

        let slots: Vec<usize> = output.effects.iter().map(|e| e.slot).collect();
        assert_eq!(slots, vec![1]);
    }

    #[test]
    fn refs_survive_renders_by_identity() {
        let queue = UpdateQueue::new();
        let contexts = ContextStack::new();
        let handle = RefHandle::new(Value::Int(1));
        let previous = vec![HookSlot::Ref(handle.clone())];
        let mut cx = RenderCx::new(node(), "R", Lane::Sync, Some(previous.as_slice()), &[], &queue, &contexts);

        let reused = cx.use_ref(0).unwrap();
        assert!(reused.ptr_eq(&handle));
        reused.set(9);
        assert_eq!(handle.get(), Value::Int(9));
    }

    #[test]
    fn context_reads_are_recorded_once() {
        let queue = UpdateQueue::new();
        let theme = Context::new("Theme", "light");
        let mut contexts = ContextStack::new();
        contexts.push(theme.id(), Value::from("dark"));
        let mut cx = RenderCx::new(node(), "C", Lane::Sync, None, &[], &queue, &contexts);

        assert_eq!(cx.use_context(&theme).as_text(), Some("dark"));
        cx.use_context(&theme);
        assert_eq!(cx.finish().unwrap().context_reads.len(), 1);
    }
}
