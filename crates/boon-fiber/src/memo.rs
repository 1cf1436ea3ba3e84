//! Memoization Gate.
//!
//! Decides whether a visited node re-executes its render function. The gate
//! only governs re-execution; descending into a skipped subtree is decided by
//! the render walk, so context changes still reach consumers below.

use crate::element::{ElementKind, MemoPolicy};
use crate::value::{Value, shallow_equal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decision {
    Render,
    Bailout,
}

/// Why the walk reached a node.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Visit<'a> {
    /// First render of a fresh identity.
    pub(crate) created: bool,
    /// Own queued updates or a changed context it reads.
    pub(crate) dirty: bool,
    /// Props from a parent that re-rendered this pass.
    pub(crate) next_props: Option<&'a Value>,
}

pub(crate) fn decide(kind: &ElementKind, committed_props: &Value, visit: Visit<'_>) -> Decision {
    if visit.created || visit.dirty {
        return Decision::Render;
    }
    let Some(next_props) = visit.next_props else {
        return Decision::Bailout;
    };
    match kind {
        // providers re-reconcile their children whenever the parent re-rendered
        ElementKind::Provider(_) => Decision::Render,
        ElementKind::Component(component) => match component.memo_policy() {
            None => Decision::Render,
            Some(policy) if props_equal(policy, committed_props, next_props) => Decision::Bailout,
            Some(_) => Decision::Render,
        },
    }
}

fn props_equal(policy: &MemoPolicy, previous: &Value, next: &Value) -> bool {
    match policy {
        MemoPolicy::Shallow => shallow_equal(previous, next),
        MemoPolicy::Custom(compare) => compare(previous, next),
    }
}
