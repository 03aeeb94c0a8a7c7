//! Cross-kind ordering.
//!
//! [`EntityKind::dependencies`] is the hand-maintained partial order; this
//! module sorts it. Creates and updates run in [`dependency_order`], deletes
//! in its reverse.

use std::collections::{BTreeMap, VecDeque};

use gwr_schemas::EntityKind;

/// Kahn's algorithm over the static dependency edges. Ready kinds are
/// released FIFO in declaration order so the result never changes between
/// runs.
pub fn dependency_order() -> Vec<EntityKind> {
    let mut indegree: BTreeMap<EntityKind, usize> = EntityKind::ALL
        .into_iter()
        .map(|k| (k, k.dependencies().len()))
        .collect();
    let mut ready: VecDeque<EntityKind> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut order = Vec::with_capacity(EntityKind::ALL.len());

    while let Some(next) = ready.pop_front() {
        indegree.remove(&next);
        order.push(next);
        for (k, n) in indegree.iter_mut() {
            if k.dependencies().contains(&next) {
                *n -= 1;
                if *n == 0 {
                    ready.push_back(*k);
                }
            }
        }
    }

    // A cycle would leave kinds behind; keep them rather than lose events.
    order.extend(indegree.into_keys());
    order
}

/// Kinds grouped by depth (longest dependency chain below them). Kinds in
/// one level never depend on each other.
pub fn dependency_levels() -> Vec<Vec<EntityKind>> {
    let mut depth: BTreeMap<EntityKind, usize> = BTreeMap::new();
    for kind in dependency_order() {
        let d = kind
            .dependencies()
            .iter()
            .filter_map(|dep| depth.get(dep))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(kind, d);
    }

    let mut levels: Vec<Vec<EntityKind>> = Vec::new();
    for kind in EntityKind::ALL {
        let d = depth.get(&kind).copied().unwrap_or(0);
        if levels.len() <= d {
            levels.resize_with(d + 1, Vec::new);
        }
        levels[d].push(kind);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(order: &[EntityKind], k: EntityKind) -> usize {
        order.iter().position(|x| *x == k).unwrap()
    }

    #[test]
    fn every_dependency_precedes_its_dependent() {
        let order = dependency_order();
        assert_eq!(order.len(), EntityKind::ALL.len());
        for k in EntityKind::ALL {
            for dep in k.dependencies() {
                assert!(pos(&order, *dep) < pos(&order, k), "{dep} before {k}");
            }
        }
    }

    #[test]
    fn order_is_stable() {
        assert_eq!(
            dependency_order(),
            vec![
                EntityKind::Service,
                EntityKind::Upstream,
                EntityKind::Consumer,
                EntityKind::Certificate,
                EntityKind::Route,
                EntityKind::Target,
                EntityKind::Plugin,
            ]
        );
    }

    #[test]
    fn levels_group_independent_kinds() {
        let levels = dependency_levels();
        assert_eq!(
            levels,
            vec![
                vec![
                    EntityKind::Service,
                    EntityKind::Upstream,
                    EntityKind::Consumer,
                    EntityKind::Certificate
                ],
                vec![EntityKind::Route, EntityKind::Target],
                vec![EntityKind::Plugin],
            ]
        );
    }
}
