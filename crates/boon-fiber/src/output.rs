//! What hosts receive: committed output trees, commit reports and failures.

use crate::address::{Key, NodeId};
use crate::arena::Arena;
use crate::effects::EffectEvent;
use crate::error::RuntimeError;
use crate::lane::Lane;
use crate::render::Fiber;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Committed output of one node and its descendants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputNode {
    pub id: NodeId,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutputNode>,
}

impl OutputNode {
    /// Build the committed output below `root`.
    pub(crate) fn build(arena: &Arena<Fiber>, root: NodeId) -> Option<OutputNode> {
        let fiber = arena.get(root)?;
        Some(OutputNode {
            id: root,
            component: fiber.name().to_string(),
            key: fiber.key.clone(),
            value: fiber.value.clone(),
            children: fiber
                .children
                .iter()
                .filter_map(|&child| OutputNode::build(arena, child))
                .collect(),
        })
    }

    /// Descend along a `/`-separated path of child selectors:
    /// - `Name` first child rendered by component `Name`
    /// - `Name#key` child of `Name` with that key
    /// - `Name[n]` n-th child of `Name`
    ///
    /// The empty path selects `self`.
    pub fn at(&self, path: &str) -> Option<&OutputNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.child(segment))
    }

    fn child(&self, segment: &str) -> Option<&OutputNode> {
        if let Some((name, key)) = segment.split_once('#') {
            return self.children.iter().find(|child| {
                child.component == name && child.key.as_ref().is_some_and(|k| k.to_string() == key)
            });
        }
        if let Some((name, rest)) = segment.split_once('[') {
            let index: usize = rest.strip_suffix(']')?.parse().ok()?;
            return self
                .children
                .iter()
                .filter(|child| child.component == name)
                .nth(index);
        }
        self.children.iter().find(|child| child.component == segment)
    }

    /// Number of nodes in this tree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(OutputNode::node_count).sum::<usize>()
    }

    /// Visit every node depth-first, parents before children.
    pub fn walk(&self, visit: &mut impl FnMut(&OutputNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Summary of one commit, delivered to `Host::on_commit`.
#[derive(Clone, Debug)]
pub struct CommitReport {
    pub lane: Lane,
    pub seq: u64,
    /// Output trees of every mounted root; empty when output delivery is off.
    pub trees: Vec<OutputNode>,
    pub created: Vec<NodeId>,
    pub updated: Vec<NodeId>,
    pub destroyed: Vec<NodeId>,
    pub effects: Vec<EffectEvent>,
    /// Effect and cleanup failures of this commit.
    pub errors: Vec<RuntimeError>,
}

impl CommitReport {
    pub fn tree(&self, root: NodeId) -> Option<&OutputNode> {
        self.trees.iter().find(|tree| tree.id == root)
    }
}

/// Receiver of committed output. Implementations materialize trees however
/// they like; the runtime never calls back into itself from here.
pub trait Host {
    fn on_commit(&mut self, report: &CommitReport);

    /// Aborted passes, update loops and commit failures.
    fn on_error(&mut self, _error: &RuntimeError) {}
}

#[derive(Debug, Default)]
pub struct NoopHost;

impl Host for NoopHost {
    fn on_commit(&mut self, _report: &CommitReport) {}
}
