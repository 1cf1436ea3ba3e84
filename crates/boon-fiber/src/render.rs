//! Reconciler walk.
//!
//! A `RenderPass` walks the committed tree depth-first with an explicit work
//! stack, so a transition pass can stop between two nodes and resume on the
//! next slice. Nothing committed is written during the walk: re-rendered and
//! created nodes are collected in a `Draft` that the runtime either commits
//! or throws away.

use crate::address::{ContextId, Key, NodeId};
use crate::arena::Arena;
use crate::context::{ContextStack, propagate_change};
use crate::effects::PendingEffect;
use crate::element::{Element, ElementKind};
use crate::error::RuntimeError;
use crate::hooks::{HookSlot, RenderCx};
use crate::identity::{PreviousChild, resolve_children};
use crate::lane::{Lane, LaneBatch, UpdateQueue};
use crate::memo::{Decision, Visit, decide};
use crate::value::Value;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

/// Committed state of one node.
#[derive(Clone, Debug)]
pub(crate) struct Fiber {
    pub(crate) kind: ElementKind,
    pub(crate) key: Option<Key>,
    /// Component props, or the provided value for providers.
    pub(crate) props: Value,
    pub(crate) parent: Option<NodeId>,
    pub(crate) depth: u32,
    pub(crate) children: SmallVec<[NodeId; 4]>,
    pub(crate) hooks: Vec<HookSlot>,
    /// Rendered value delivered to the host.
    pub(crate) value: Value,
    pub(crate) context_reads: SmallVec<[ContextId; 2]>,
}

impl Fiber {
    pub(crate) fn provides(&self, context: ContextId) -> bool {
        matches!(&self.kind, ElementKind::Provider(provided) if provided.id() == context)
    }

    pub(crate) fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// A node waiting to be visited.
#[derive(Debug)]
pub(crate) struct Unit {
    pub(crate) node: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) depth: u32,
    /// New descriptor when the parent re-rendered this pass.
    pub(crate) element: Option<Element>,
    pub(crate) created: bool,
}

impl Unit {
    pub(crate) fn root(node: NodeId, element: Option<Element>, created: bool) -> Self {
        Self {
            node,
            parent: None,
            depth: 0,
            element,
            created,
        }
    }
}

#[derive(Debug)]
enum Step {
    Enter(Unit),
    Leave(ContextId),
}

/// Everything a pass would change, applied only at commit.
#[derive(Default)]
pub(crate) struct Draft {
    /// New fiber of every rendered node, in visit order.
    pub(crate) fibers: Vec<(NodeId, Fiber)>,
    pub(crate) created: Vec<NodeId>,
    pub(crate) updated: Vec<NodeId>,
    /// Ids reserved in the arena for created nodes.
    pub(crate) reserved: Vec<NodeId>,
    /// Roots of committed subtrees that lost their place.
    pub(crate) removed: Vec<NodeId>,
    pub(crate) effects: Vec<PendingEffect>,
}

impl Draft {
    pub(crate) fn is_empty(&self) -> bool {
        self.fibers.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Progress {
    Complete,
    /// Budget spent; the pass can be resumed.
    Yielded,
    /// Synchronous work arrived; the pass must be discarded.
    Interrupted,
}

pub(crate) struct RenderPass {
    pub(crate) lane: Lane,
    pub(crate) batch: LaneBatch,
    dirty: FxHashSet<NodeId>,
    subtree_dirty: FxHashSet<NodeId>,
    stack: Vec<Step>,
    contexts: ContextStack,
    pub(crate) draft: Draft,
    visits: usize,
    /// Node whose visit failed, with its parent.
    failed: Option<(NodeId, Option<NodeId>)>,
}

impl RenderPass {
    pub(crate) fn new(
        lane: Lane,
        batch: LaneBatch,
        arena: &Arena<Fiber>,
        roots: impl DoubleEndedIterator<Item = Unit>,
    ) -> Self {
        let mut dirty = FxHashSet::default();
        let mut subtree_dirty = FxHashSet::default();
        for target in batch.targets() {
            // updates aimed at destroyed nodes are dropped silently
            if !arena.contains(target) {
                continue;
            }
            dirty.insert(target);
            mark_ancestors(arena, target, &mut subtree_dirty);
        }
        log::debug!("{} pass started with {} dirty nodes", lane, dirty.len());

        Self {
            lane,
            batch,
            dirty,
            subtree_dirty,
            stack: roots.rev().map(Step::Enter).collect(),
            contexts: ContextStack::new(),
            draft: Draft::default(),
            visits: 0,
            failed: None,
        }
    }

    pub(crate) fn visits(&self) -> usize {
        self.visits
    }

    pub(crate) fn into_parts(self) -> (LaneBatch, Draft) {
        (self.batch, self.draft)
    }

    /// Continue the walk. `budget` caps the node visits of a transition pass
    /// in this call; synchronous passes ignore it and never yield.
    pub(crate) fn advance(
        &mut self,
        arena: &mut Arena<Fiber>,
        queue: &UpdateQueue,
        budget: Option<usize>,
    ) -> Result<Progress, RuntimeError> {
        let mut spent = 0;
        while let Some(step) = self.stack.pop() {
            let unit = match step {
                Step::Leave(context) => {
                    self.contexts.pop(context);
                    continue;
                }
                Step::Enter(unit) => unit,
            };
            if self.lane == Lane::Transition {
                if queue.has_pending(Lane::Sync) {
                    self.stack.push(Step::Enter(unit));
                    return Ok(Progress::Interrupted);
                }
                if budget.is_some_and(|budget| spent >= budget) {
                    self.stack.push(Step::Enter(unit));
                    return Ok(Progress::Yielded);
                }
            }
            spent += 1;
            self.visits += 1;
            let (node, parent) = (unit.node, unit.parent);
            if let Err(err) = self.visit(unit, arena, queue) {
                self.failed = Some((node, parent));
                return Err(err);
            }
        }
        Ok(Progress::Complete)
    }

    /// Nearest node at or above the failed visit with updates in this pass's
    /// batch. Those updates triggered the failure.
    pub(crate) fn failure_target(&self, arena: &Arena<Fiber>) -> Option<NodeId> {
        let (node, parent) = self.failed?;
        let mut current = Some(node);
        let mut fallback_parent = parent;
        while let Some(id) = current {
            if !self.batch.updates_for(id).is_empty() {
                return Some(id);
            }
            let staged = self
                .draft
                .fibers
                .iter()
                .find(|(staged, _)| *staged == id)
                .map(|(_, fiber)| fiber);
            current = match staged.or_else(|| arena.get(id)) {
                Some(fiber) => fiber.parent,
                None => fallback_parent,
            };
            fallback_parent = None;
        }
        None
    }

    /// Release every id the pass reserved. The draft is dropped with `self`.
    pub(crate) fn discard(self, arena: &mut Arena<Fiber>) {
        log::debug!(
            "discarding {} pass after {} visits ({} staged nodes)",
            self.lane,
            self.visits,
            self.draft.fibers.len()
        );
        for id in self.draft.reserved {
            arena.release(id);
        }
    }

    fn visit(&mut self, unit: Unit, arena: &mut Arena<Fiber>, queue: &UpdateQueue) -> Result<(), RuntimeError> {
        let committed = arena.get(unit.node);
        let kind = match (&unit.element, committed) {
            (Some(element), _) => element.kind.clone(),
            (None, Some(fiber)) => fiber.kind.clone(),
            (None, None) => {
                log::trace!("{} vanished before its visit", unit.node);
                return Ok(());
            }
        };

        let decision = match committed {
            Some(fiber) if !unit.created => decide(
                &kind,
                &fiber.props,
                Visit {
                    created: false,
                    dirty: self.dirty.contains(&unit.node),
                    next_props: unit.element.as_ref().map(|element| &element.props),
                },
            ),
            _ => Decision::Render,
        };

        match (decision, &kind, unit.element) {
            (Decision::Render, ElementKind::Component(component), element) => {
                let (props, key) = match (element, committed) {
                    (Some(element), _) => (element.props, element.key),
                    (None, Some(fiber)) => (fiber.props.clone(), fiber.key.clone()),
                    (None, None) => (Value::Null, None),
                };
                log::trace!("render {} {}", component.name(), unit.node);

                let mut cx = RenderCx::new(
                    unit.node,
                    component.name(),
                    self.lane,
                    committed.map(|fiber| fiber.hooks.as_slice()),
                    self.batch.updates_for(unit.node),
                    queue,
                    &self.contexts,
                );
                let view = component.render(&mut cx, &props)?;
                let output = cx.finish()?;

                let previous = previous_children(arena, committed);
                let reserved = &mut self.draft.reserved;
                let plan = resolve_children(unit.node, &previous, view.children, || {
                    let id = arena.reserve();
                    reserved.push(id);
                    id
                })?;

                for staged in output.effects {
                    self.draft.effects.push(PendingEffect {
                        node: unit.node,
                        slot: staged.slot,
                        depth: unit.depth,
                        order: self.visits,
                        run: staged.run,
                    });
                }

                let fiber = Fiber {
                    kind: kind.clone(),
                    key,
                    props,
                    parent: unit.parent,
                    depth: unit.depth,
                    children: plan.assignments.iter().map(|a| a.node).collect(),
                    hooks: output.hooks,
                    value: view.value,
                    context_reads: output.context_reads,
                };
                self.stage(unit.node, unit.created, fiber, plan.removed);
                self.push_children(unit.node, unit.depth, plan.assignments.into_iter().map(|a| (a.node, Some(a.element), a.created)));
            }
            (Decision::Render, ElementKind::Provider(context), Some(element)) => {
                log::trace!("provide {} at {}", context.name(), unit.node);
                let changed = committed.is_some_and(|fiber| !fiber.props.same(&element.props));
                if changed && !unit.created {
                    propagate_change(arena, unit.node, context.id(), &mut self.dirty, &mut self.subtree_dirty);
                }

                let previous = previous_children(arena, arena.get(unit.node));
                let reserved = &mut self.draft.reserved;
                let plan = resolve_children(unit.node, &previous, element.children, || {
                    let id = arena.reserve();
                    reserved.push(id);
                    id
                })?;

                let fiber = Fiber {
                    kind: kind.clone(),
                    key: element.key,
                    props: element.props.clone(),
                    parent: unit.parent,
                    depth: unit.depth,
                    children: plan.assignments.iter().map(|a| a.node).collect(),
                    hooks: Vec::new(),
                    value: element.props.clone(),
                    context_reads: SmallVec::new(),
                };
                self.stage(unit.node, unit.created, fiber, plan.removed);
                self.contexts.push(context.id(), element.props);
                self.stack.push(Step::Leave(context.id()));
                self.push_children(unit.node, unit.depth, plan.assignments.into_iter().map(|a| (a.node, Some(a.element), a.created)));
            }
            _ => {
                if !self.subtree_dirty.contains(&unit.node) {
                    log::trace!("skip {} {}", kind.name(), unit.node);
                    return Ok(());
                }
                let Some(fiber) = committed else {
                    return Ok(());
                };
                log::trace!("bailout {} {}, descending", kind.name(), unit.node);
                let children = fiber.children.clone();
                if let ElementKind::Provider(context) = &fiber.kind {
                    let value = fiber.props.clone();
                    self.contexts.push(context.id(), value);
                    self.stack.push(Step::Leave(context.id()));
                }
                self.push_children(unit.node, unit.depth, children.into_iter().map(|child| (child, None, false)));
            }
        }
        Ok(())
    }

    fn stage(&mut self, node: NodeId, created: bool, fiber: Fiber, removed: Vec<NodeId>) {
        if created {
            self.draft.created.push(node);
        } else {
            self.draft.updated.push(node);
        }
        self.draft.fibers.push((node, fiber));
        self.draft.removed.extend(removed);
    }

    fn push_children(
        &mut self,
        parent: NodeId,
        depth: u32,
        children: impl DoubleEndedIterator<Item = (NodeId, Option<Element>, bool)>,
    ) {
        self.stack.extend(children.rev().map(|(node, element, created)| {
            Step::Enter(Unit {
                node,
                parent: Some(parent),
                depth: depth + 1,
                element,
                created,
            })
        }));
    }
}

fn previous_children(arena: &Arena<Fiber>, committed: Option<&Fiber>) -> Vec<PreviousChild> {
    let Some(fiber) = committed else {
        return Vec::new();
    };
    fiber
        .children
        .iter()
        .filter_map(|&id| {
            arena.get(id).map(|child| PreviousChild {
                id,
                element_type: child.kind.element_type(),
                key: child.key.clone(),
            })
        })
        .collect()
}

fn mark_ancestors(arena: &Arena<Fiber>, node: NodeId, subtree_dirty: &mut FxHashSet<NodeId>) {
    let mut parent = arena.get(node).and_then(|fiber| fiber.parent);
    while let Some(ancestor) = parent {
        if !subtree_dirty.insert(ancestor) {
            break;
        }
        parent = arena.get(ancestor).and_then(|fiber| fiber.parent);
    }
}

/// Committed subtree of `root` in post-order (children before parents) with
/// each node's depth.
pub(crate) fn collect_subtree(arena: &Arena<Fiber>, root: NodeId) -> Vec<(NodeId, u32)> {
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        let Some(fiber) = arena.get(id) else {
            continue;
        };
        if expanded {
            order.push((id, fiber.depth));
        } else {
            stack.push((id, true));
            stack.extend(fiber.children.iter().rev().map(|&child| (child, false)));
        }
    }
    order
}
