//! Update lanes and the shared update queue.
//!
//! Hook setters, dispatchers and host code never touch committed state; they
//! enqueue `UpdateTask`s here and the runtime drains them lane by lane.
//! Tasks stay queued until the pass that applied them commits, so a discarded
//! transition pass can be recomputed from the same tasks.

use crate::address::NodeId;
use crate::value::Value;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Priority class of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lane {
    Sync,
    Transition,
}

impl Lane {
    fn index(self) -> usize {
        match self {
            Lane::Sync => 0,
            Lane::Transition => 1,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Sync => f.write_str("sync"),
            Lane::Transition => f.write_str("transition"),
        }
    }
}

/// Where the scheduler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    Rendering(Lane),
    Committing,
}

/// A state change requested for one hook slot.
#[derive(Clone)]
pub enum Mutation {
    /// Replace the slot value.
    Replace(Value),
    /// Derive the next value from the previous one.
    Apply(Rc<dyn Fn(&Value) -> Value>),
    /// Reducer action. Applied to a state slot it acts as `Replace`.
    Action(Value),
}

impl Mutation {
    pub fn apply(f: impl Fn(&Value) -> Value + 'static) -> Self {
        Mutation::Apply(Rc::new(f))
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Replace(v) => f.debug_tuple("Replace").field(v).finish(),
            Mutation::Apply(_) => f.write_str("Apply(..)"),
            Mutation::Action(v) => f.debug_tuple("Action").field(v).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UpdateTask {
    pub target: NodeId,
    pub slot: usize,
    pub mutation: Mutation,
    pub lane: Lane,
    pub seq: u64,
}

#[derive(Default)]
struct QueueState {
    tasks: Vec<UpdateTask>,
    next_seq: u64,
    pending: [usize; 2],
    latest: [Option<u64>; 2],
    transition_depth: u32,
}

/// Shared handle to the update queue. Cloning shares the same queue.
#[derive(Clone, Default)]
pub struct UpdateQueue {
    state: Rc<RefCell<QueueState>>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task; returns its sequence number.
    pub fn enqueue(&self, target: NodeId, slot: usize, mutation: Mutation, lane: Lane) -> u64 {
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending[lane.index()] += 1;
        state.latest[lane.index()] = Some(seq);
        log::trace!("enqueue {:?} for {} slot {} in {} lane (seq {})", mutation, target, slot, lane, seq);
        state.tasks.push(UpdateTask {
            target,
            slot,
            mutation,
            lane,
            seq,
        });
        seq
    }

    /// Lane for updates issued right now: transition inside `start_transition`,
    /// sync otherwise.
    pub fn current_lane(&self) -> Lane {
        if self.state.borrow().transition_depth > 0 {
            Lane::Transition
        } else {
            Lane::Sync
        }
    }

    /// Run `f` with every setter call inside it routed to the transition lane.
    pub fn start_transition<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Scope<'a>(&'a UpdateQueue);
        impl Drop for Scope<'_> {
            fn drop(&mut self) {
                self.0.state.borrow_mut().transition_depth -= 1;
            }
        }

        self.state.borrow_mut().transition_depth += 1;
        let _scope = Scope(self);
        f()
    }

    pub fn has_pending(&self, lane: Lane) -> bool {
        self.state.borrow().pending[lane.index()] > 0
    }

    pub fn pending(&self, lane: Lane) -> usize {
        self.state.borrow().pending[lane.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().tasks.is_empty()
    }

    /// Highest sequence number ever enqueued in `lane`.
    pub fn latest_seq(&self, lane: Lane) -> Option<u64> {
        self.state.borrow().latest[lane.index()]
    }

    /// Copy of every queued task of `lane`, grouped by target in enqueue order.
    pub(crate) fn batch(&self, lane: Lane) -> LaneBatch {
        let state = self.state.borrow();
        let mut by_node: FxHashMap<NodeId, Vec<UpdateTask>> = FxHashMap::default();
        let mut upto = None;
        for task in state.tasks.iter().filter(|t| t.lane == lane) {
            upto = Some(task.seq);
            by_node.entry(task.target).or_default().push(task.clone());
        }
        LaneBatch { lane, upto, by_node }
    }

    /// Drop the tasks a committed (or failed) pass consumed.
    pub(crate) fn retire(&self, batch: &LaneBatch) {
        let Some(upto) = batch.upto else {
            return;
        };
        let lane = batch.lane;
        self.retain(|task| !(task.lane == lane && task.seq <= upto));
    }

    /// Drop only the tasks `batch` holds for `target`; the rest of the lane
    /// stays queued.
    pub(crate) fn retire_target(&self, batch: &LaneBatch, target: NodeId) {
        let seqs: FxHashSet<u64> = batch.updates_for(target).iter().map(|task| task.seq).collect();
        self.retain(|task| !seqs.contains(&task.seq));
    }

    /// Drop tasks aimed at destroyed nodes.
    pub(crate) fn drop_targets(&self, nodes: &FxHashSet<NodeId>) {
        if nodes.is_empty() {
            return;
        }
        self.retain(|task| !nodes.contains(&task.target));
    }

    pub(crate) fn clear(&self) {
        self.retain(|_| false);
    }

    fn retain(&self, mut keep: impl FnMut(&UpdateTask) -> bool) {
        let mut state = self.state.borrow_mut();
        let mut pending = [0usize; 2];
        state.tasks.retain(|task| {
            let kept = keep(task);
            if kept {
                pending[task.lane.index()] += 1;
            }
            kept
        });
        state.pending = pending;
    }
}

/// Snapshot of one lane's tasks taken when a render pass starts. Tasks
/// enqueued later are not part of the pass.
pub(crate) struct LaneBatch {
    pub(crate) lane: Lane,
    pub(crate) upto: Option<u64>,
    by_node: FxHashMap<NodeId, Vec<UpdateTask>>,
}

impl LaneBatch {
    pub(crate) fn empty(lane: Lane) -> Self {
        Self {
            lane,
            upto: None,
            by_node: FxHashMap::default(),
        }
    }

    pub(crate) fn updates_for(&self, node: NodeId) -> &[UpdateTask] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.by_node.keys().copied()
    }

    /// A newer task of this lane arrived after the snapshot.
    pub(crate) fn is_stale(&self, queue: &UpdateQueue) -> bool {
        queue.latest_seq(self.lane) > self.upto
    }
}

/// Setter returned by `use_state`.
#[derive(Clone)]
pub struct StateSetter {
    pub(crate) node: NodeId,
    pub(crate) slot: usize,
    pub(crate) queue: UpdateQueue,
}

impl StateSetter {
    pub fn set(&self, value: impl Into<Value>) {
        self.send(Mutation::Replace(value.into()));
    }

    pub fn update(&self, f: impl Fn(&Value) -> Value + 'static) {
        self.send(Mutation::apply(f));
    }

    /// Enqueue in an explicit lane, ignoring any surrounding transition.
    pub fn set_in(&self, lane: Lane, value: impl Into<Value>) {
        self.queue
            .enqueue(self.node, self.slot, Mutation::Replace(value.into()), lane);
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn send(&self, mutation: Mutation) {
        self.queue
            .enqueue(self.node, self.slot, mutation, self.queue.current_lane());
    }
}

impl fmt::Debug for StateSetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateSetter({}, slot {})", self.node, self.slot)
    }
}

/// Dispatcher returned by `use_reducer`.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) node: NodeId,
    pub(crate) slot: usize,
    pub(crate) queue: UpdateQueue,
}

impl Dispatcher {
    pub fn dispatch(&self, action: impl Into<Value>) {
        self.queue.enqueue(
            self.node,
            self.slot,
            Mutation::Action(action.into()),
            self.queue.current_lane(),
        );
    }

    pub fn dispatch_in(&self, lane: Lane, action: impl Into<Value>) {
        self.queue
            .enqueue(self.node, self.slot, Mutation::Action(action.into()), lane);
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatcher({}, slot {})", self.node, self.slot)
    }
}

/// Handle returned by `use_transition`.
#[derive(Clone)]
pub struct Transition {
    pub(crate) queue: UpdateQueue,
}

impl Transition {
    pub fn start<R>(&self, f: impl FnOnce() -> R) -> R {
        self.queue.start_transition(f)
    }
}
