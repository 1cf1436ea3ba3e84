//! Effect Scheduler.
//!
//! Effects are staged during render and only run after the commit that
//! produced them. Cleanups returned by effect bodies are owed by the node
//! until the same slot re-runs or the node is destroyed.
//!
//! Commit order:
//! 1. cleanups of destroyed nodes, deepest first
//! 2. cleanups of re-running effects on surviving nodes, deepest first
//! 3. effect bodies, shallowest first, siblings in tree order

use crate::address::NodeId;
use crate::error::{EffectPhase, RuntimeError};
use crate::value::{Value, deps_equal};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

/// When an effect re-runs.
#[derive(Clone, Debug, PartialEq)]
pub enum Deps {
    /// After every commit in which the node rendered.
    Always,
    /// Once, after the node's first commit.
    Once,
    /// Whenever any entry differs (by `Value::same`) from the previous render.
    List(Vec<Value>),
}

impl Deps {
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        let items: Vec<Value> = items.into_iter().collect();
        if items.is_empty() {
            Deps::Once
        } else {
            Deps::List(items)
        }
    }

    /// `true` when an effect declared with `self` may be skipped given the
    /// deps of its previous run.
    pub(crate) fn unchanged_since(&self, previous: &Deps) -> bool {
        match (self, previous) {
            (Deps::Once, Deps::Once) => true,
            (Deps::List(next), Deps::List(prev)) => deps_equal(prev, next),
            _ => false,
        }
    }
}

/// Cleanup returned by an effect body.
pub struct Cleanup(Box<dyn FnOnce() -> anyhow::Result<()>>);

impl Cleanup {
    pub fn new(f: impl FnOnce() -> anyhow::Result<()> + 'static) -> Self {
        Self(Box::new(f))
    }

    fn run(self) -> anyhow::Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

pub(crate) type EffectFn = Box<dyn FnOnce() -> anyhow::Result<Option<Cleanup>>>;

/// Effect declared by one render, not yet committed.
pub(crate) struct StagedEffect {
    pub(crate) slot: usize,
    pub(crate) run: EffectFn,
}

/// Staged effect tagged with its position in the committed tree.
pub(crate) struct PendingEffect {
    pub(crate) node: NodeId,
    pub(crate) slot: usize,
    pub(crate) depth: u32,
    /// Pre-order visit index within the pass.
    pub(crate) order: usize,
    pub(crate) run: EffectFn,
}

/// One executed cleanup or effect body, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectEvent {
    Cleanup { node: NodeId, slot: usize },
    Run { node: NodeId, slot: usize },
}

#[derive(Debug, Default)]
pub(crate) struct EffectOutcome {
    pub(crate) events: Vec<EffectEvent>,
    pub(crate) failures: Vec<RuntimeError>,
}

#[derive(Default)]
pub struct EffectScheduler {
    owed: FxHashMap<NodeId, BTreeMap<usize, Cleanup>>,
}

impl EffectScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cleanups currently owed across all live nodes.
    pub fn owed_cleanups(&self) -> usize {
        self.owed.values().map(BTreeMap::len).sum()
    }

    /// Run every cleanup and effect owed by one commit. `destroyed` carries
    /// each removed node with its depth.
    pub(crate) fn commit(
        &mut self,
        destroyed: &[(NodeId, u32)],
        mut effects: Vec<PendingEffect>,
    ) -> EffectOutcome {
        let mut outcome = EffectOutcome::default();

        let mut doomed = destroyed.to_vec();
        doomed.sort_by_key(|&(_, depth)| Reverse(depth));
        for (node, _) in doomed {
            if let Some(cleanups) = self.owed.remove(&node) {
                for (slot, cleanup) in cleanups {
                    run_cleanup(node, slot, cleanup, &mut outcome);
                }
            }
        }

        effects.sort_by_key(|effect| (Reverse(effect.depth), effect.order));
        for effect in &effects {
            let owed = self
                .owed
                .get_mut(&effect.node)
                .and_then(|cleanups| cleanups.remove(&effect.slot));
            if let Some(cleanup) = owed {
                run_cleanup(effect.node, effect.slot, cleanup, &mut outcome);
            }
        }

        effects.sort_by_key(|effect| (effect.depth, effect.order));
        for effect in effects {
            let PendingEffect { node, slot, run, .. } = effect;
            outcome.events.push(EffectEvent::Run { node, slot });
            match run() {
                Ok(Some(cleanup)) => {
                    self.owed.entry(node).or_default().insert(slot, cleanup);
                }
                Ok(None) => {}
                Err(err) => {
                    log::warn!("effect in slot {} of {} failed: {:#}", slot, node, err);
                    outcome.failures.push(RuntimeError::EffectFailure {
                        node,
                        slot,
                        phase: EffectPhase::Run,
                        message: format!("{:#}", err),
                    });
                }
            }
        }

        self.owed.retain(|_, cleanups| !cleanups.is_empty());
        outcome
    }
}

fn run_cleanup(node: NodeId, slot: usize, cleanup: Cleanup, outcome: &mut EffectOutcome) {
    outcome.events.push(EffectEvent::Cleanup { node, slot });
    if let Err(err) = cleanup.run() {
        log::warn!("cleanup in slot {} of {} failed: {:#}", slot, node, err);
        outcome.failures.push(RuntimeError::EffectFailure {
            node,
            slot,
            phase: EffectPhase::Cleanup,
            message: format!("{:#}", err),
        });
    }
}
