//! Context Propagator.
//!
//! Provided values live on a stack that mirrors the render walk. A provider
//! whose value changed marks every committed consumer below it, so consumers
//! re-render even when a memoized ancestor between them bails out.

use crate::address::{ContextId, NodeId};
use crate::arena::Arena;
use crate::element::Context;
use crate::render::Fiber;
use crate::value::Value;
use rustc_hash::FxHashSet;

#[derive(Clone, Debug, Default)]
pub struct ContextStack {
    entries: Vec<(ContextId, Value)>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: ContextId, value: Value) {
        self.entries.push((context, value));
    }

    /// Pop the innermost entry, which must belong to `context`.
    pub fn pop(&mut self, context: ContextId) {
        let popped = self.entries.pop();
        debug_assert_eq!(popped.map(|(id, _)| id), Some(context));
    }

    /// Innermost provided value, or the context default.
    pub fn read(&self, context: &Context) -> Value {
        self.entries
            .iter()
            .rev()
            .find(|(id, _)| *id == context.id())
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| context.default_value().clone())
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }
}

/// Mark consumers of `context` in the committed subtree of `provider`.
///
/// Nested providers of the same context shadow it and are not descended.
/// Consumers go into `dirty`; nodes strictly between the provider and a
/// consumer go into `subtree_dirty` so a bailing-out ancestor still walks
/// down to them.
pub(crate) fn propagate_change(
    arena: &Arena<Fiber>,
    provider: NodeId,
    context: ContextId,
    dirty: &mut FxHashSet<NodeId>,
    subtree_dirty: &mut FxHashSet<NodeId>,
) -> usize {
    let Some(root) = arena.get(provider) else {
        return 0;
    };
    let mut marked = 0;
    let mut stack: Vec<NodeId> = root.children.iter().rev().copied().collect();

    while let Some(id) = stack.pop() {
        let Some(fiber) = arena.get(id) else {
            continue;
        };
        if fiber.provides(context) {
            continue;
        }
        if fiber.context_reads.contains(&context) {
            dirty.insert(id);
            marked += 1;
            let mut parent = fiber.parent;
            while let Some(ancestor) = parent {
                if ancestor == provider || !subtree_dirty.insert(ancestor) {
                    break;
                }
                parent = arena.get(ancestor).and_then(|f| f.parent);
            }
        }
        stack.extend(fiber.children.iter().rev().copied());
    }

    log::trace!("context change at {} marked {} consumers", provider, marked);
    marked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_value_wins() {
        let theme = Context::new("Theme", "light");
        let mut stack = ContextStack::new();
        assert_eq!(stack.read(&theme).as_text(), Some("light"));

        stack.push(theme.id(), Value::from("dark"));
        stack.push(theme.id(), Value::from("blue"));
        assert_eq!(stack.read(&theme).as_text(), Some("blue"));

        stack.pop(theme.id());
        assert_eq!(stack.read(&theme).as_text(), Some("dark"));
        stack.pop(theme.id());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn unrelated_context_falls_back_to_default() {
        let theme = Context::new("Theme", "light");
        let locale = Context::new("Locale", "en");
        let mut stack = ContextStack::new();
        stack.push(theme.id(), Value::from("dark"));
        assert_eq!(stack.read(&locale).as_text(), Some("en"));
    }
}
