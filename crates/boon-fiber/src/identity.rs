//! Node Identity Resolver.
//!
//! Matches a parent's new child descriptors against its committed children.
//! A child is reused when its element type matches and it occupies the same
//! key (keyed lists) or the same position (unkeyed lists). Everything else is
//! created fresh, and unmatched previous children are destroyed.

use crate::address::{ElementType, Key, NodeId};
use crate::element::Element;
use crate::error::{KeyConflict, RuntimeError};
use rustc_hash::{FxHashMap, FxHashSet};

/// Committed child as seen by the resolver.
#[derive(Clone, Debug)]
pub(crate) struct PreviousChild {
    pub(crate) id: NodeId,
    pub(crate) element_type: ElementType,
    pub(crate) key: Option<Key>,
}

#[derive(Debug)]
pub(crate) struct ChildAssignment {
    pub(crate) node: NodeId,
    pub(crate) element: Element,
    pub(crate) created: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ChildPlan {
    /// One entry per new descriptor, in descriptor order.
    pub(crate) assignments: Vec<ChildAssignment>,
    /// Previous children with no counterpart, in previous order.
    pub(crate) removed: Vec<NodeId>,
}

/// Reject sibling lists whose identities are ambiguous.
pub(crate) fn validate_keys(parent: NodeId, children: &[Element]) -> Result<(), RuntimeError> {
    let keyed = children.iter().filter(|child| child.key.is_some()).count();
    if keyed != 0 && keyed != children.len() {
        return Err(RuntimeError::IdentityConflict {
            parent,
            conflict: KeyConflict::Mixed,
        });
    }
    let mut seen: FxHashSet<&Key> = FxHashSet::default();
    for key in children.iter().filter_map(|child| child.key.as_ref()) {
        if !seen.insert(key) {
            return Err(RuntimeError::IdentityConflict {
                parent,
                conflict: KeyConflict::Duplicate(key.clone()),
            });
        }
    }
    Ok(())
}

/// Resolve identities for `next`. Validation happens before any id is
/// reserved, so a rejected list leaves nothing to roll back.
pub(crate) fn resolve_children(
    parent: NodeId,
    previous: &[PreviousChild],
    next: Vec<Element>,
    mut reserve: impl FnMut() -> NodeId,
) -> Result<ChildPlan, RuntimeError> {
    validate_keys(parent, &next)?;

    let keyed = next.iter().any(|child| child.key.is_some())
        || previous.iter().any(|child| child.key.is_some());

    let mut used = vec![false; previous.len()];
    let mut assignments = Vec::with_capacity(next.len());

    if keyed {
        let by_key: FxHashMap<&Key, usize> = previous
            .iter()
            .enumerate()
            .filter_map(|(index, child)| child.key.as_ref().map(|key| (key, index)))
            .collect();

        for element in next {
            let matched = element
                .key
                .as_ref()
                .and_then(|key| by_key.get(key).copied())
                .filter(|&index| !used[index] && previous[index].element_type == element.element_type());
            assignments.push(assign(&mut used, previous, matched, element, &mut reserve));
        }
    } else {
        for (index, element) in next.into_iter().enumerate() {
            let matched = previous
                .get(index)
                .filter(|child| child.element_type == element.element_type())
                .map(|_| index);
            assignments.push(assign(&mut used, previous, matched, element, &mut reserve));
        }
    }

    let removed: Vec<NodeId> = previous
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|(child, _)| child.id)
        .collect();
    if !removed.is_empty() {
        log::trace!("{} drops {} children", parent, removed.len());
    }

    Ok(ChildPlan {
        assignments,
        removed,
    })
}

fn assign(
    used: &mut [bool],
    previous: &[PreviousChild],
    matched: Option<usize>,
    element: Element,
    reserve: &mut impl FnMut() -> NodeId,
) -> ChildAssignment {
    match matched {
        Some(index) => {
            used[index] = true;
            log::trace!("reusing {} for {}", previous[index].id, element.name());
            ChildAssignment {
                node: previous[index].id,
                element,
                created: false,
            }
        }
        None => {
            let node = reserve();
            log::trace!("creating {} for {}", node, element.name());
            ChildAssignment {
                node,
                element,
                created: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Component, View};

    fn id(index: u32) -> NodeId {
        NodeId {
            index,
            generation: 0,
        }
    }

    struct Ids(u32);

    impl Ids {
        fn next(&mut self) -> NodeId {
            self.0 += 1;
            id(self.0)
        }
    }

    fn previous(component: &Component, keys: &[Option<i64>]) -> Vec<PreviousChild> {
        keys.iter()
            .enumerate()
            .map(|(index, key)| PreviousChild {
                id: id(index as u32 + 1),
                element_type: ElementType::Component(component.id()),
                key: key.map(Key::Int),
            })
            .collect()
    }

    #[test]
    fn keyed_permutation_reuses_every_node() {
        let item = Component::new("Item", |_, _| Ok(View::empty()));
        let prev = previous(&item, &[Some(1), Some(2), Some(3)]);
        let next = vec![
            item.element(()).with_key(3),
            item.element(()).with_key(1),
            item.element(()).with_key(2),
        ];
        let mut ids = Ids(100);

        let plan = resolve_children(id(0), &prev, next, || ids.next()).unwrap();
        let nodes: Vec<NodeId> = plan.assignments.iter().map(|a| a.node).collect();
        assert_eq!(nodes, vec![id(3), id(1), id(2)]);
        assert!(plan.assignments.iter().all(|a| !a.created));
        assert!(plan.removed.is_empty());
    }

    #[test]
    fn positional_type_change_recreates() {
        let a = Component::new("A", |_, _| Ok(View::empty()));
        let b = Component::new("B", |_, _| Ok(View::empty()));
        let prev = previous(&a, &[None, None]);
        let mut ids = Ids(100);

        let plan = resolve_children(id(0), &prev, vec![a.element(()), b.element(())], || ids.next()).unwrap();
        assert!(!plan.assignments[0].created);
        assert!(plan.assignments[1].created);
        assert_eq!(plan.assignments[1].node, id(101));
        assert_eq!(plan.removed, vec![id(2)]);
    }

    #[test]
    fn changed_key_at_same_position_recreates() {
        let item = Component::new("Item", |_, _| Ok(View::empty()));
        let prev = previous(&item, &[Some(1)]);
        let mut ids = Ids(100);

        let plan = resolve_children(id(0), &prev, vec![item.element(()).with_key(2)], || ids.next()).unwrap();
        assert!(plan.assignments[0].created);
        assert_eq!(plan.removed, vec![id(1)]);
    }

    #[test]
    fn conflicts_are_rejected_before_reserving() {
        let item = Component::new("Item", |_, _| Ok(View::empty()));
        let mut reserved = 0;

        let duplicate = vec![item.element(()).with_key(1), item.element(()).with_key(1)];
        let err = resolve_children(id(0), &[], duplicate, || {
            reserved += 1;
            id(reserved)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::IdentityConflict {
                conflict: KeyConflict::Duplicate(Key::Int(1)),
                ..
            }
        ));

        let mixed = vec![item.element(()).with_key(1), item.element(())];
        let err = resolve_children(id(0), &[], mixed, || {
            reserved += 1;
            id(reserved)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::IdentityConflict {
                conflict: KeyConflict::Mixed,
                ..
            }
        ));
        assert_eq!(reserved, 0);
    }
}
