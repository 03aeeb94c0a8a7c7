use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use gwr_schemas::{Entity, EntityKind};
use gwr_state::{GatewayState, Tables};
use tracing::{debug, info};

use crate::error::DiffError;
use crate::order::dependency_order;
use crate::resolve::{resolve_desired_references, resolve_references, Assigned};
use crate::types::{ChangeEvent, ChangeOp, DiffSummary};

/// Desired-side identity checks the store's unique indexes do not cover.
///
/// Names are already unique per kind once inserted; natural keys are not
/// indexed, so two targets on the same address (or two plugins with the same
/// scope) are caught here.
pub fn validate_desired(desired: &Tables) -> Result<(), DiffError> {
    for kind in EntityKind::ALL {
        let mut seen = BTreeSet::new();
        for e in desired.all(kind) {
            let mut e = e.as_ref().clone();
            resolve_references(&mut e, &[desired]);
            if let Some(key) = e.natural_key() {
                if !seen.insert(key) {
                    return Err(DiffError::NameCollision {
                        kind,
                        identity: e.identity(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Diffs two live stores through point-in-time snapshots of each.
pub fn diff(current: &GatewayState, desired: &GatewayState) -> Result<Vec<ChangeEvent>, DiffError> {
    let current = current.snapshot();
    let desired = desired.snapshot();
    diff_snapshots(&current, &desired)
}

/// Ordered events that move `current` to `desired`.
///
/// Creates and updates come kind by kind in dependency order, then deletes
/// in reverse dependency order. Within one kind and op, events are sorted by
/// identity, except that a record taking over a name waits for the record
/// giving it up.
///
/// When the name is held by a record on its way out, that delete (and the
/// deletes of its dependents) move to an early phase at the head of the
/// stream, preceded by the updates that move surviving dependents off it.
/// Renames that can only be applied all at once fail with
/// [`DiffError::RenameCycle`] or [`DiffError::HandoffBlocked`].
pub fn diff_snapshots(current: &Tables, desired: &Tables) -> Result<Vec<ChangeEvent>, DiffError> {
    validate_desired(desired)?;

    let order = dependency_order();
    let mut assigned = Assigned::new();
    let mut per_kind: HashMap<EntityKind, KindChanges> = HashMap::new();
    for kind in &order {
        per_kind.insert(*kind, diff_kind(*kind, current, desired, &mut assigned));
    }

    let mut freed = BTreeSet::new();
    for kind in &order {
        if let Some(changes) = per_kind.get_mut(kind) {
            order_name_handoffs(*kind, current, changes, &mut freed)?;
        }
    }
    let mut events = pull_early(current, &order, &mut per_kind, freed)?;

    for kind in &order {
        if let Some(changes) = per_kind.get_mut(kind) {
            events.append(&mut changes.puts);
        }
    }
    for kind in order.iter().rev() {
        if let Some(changes) = per_kind.get_mut(kind) {
            events.append(&mut changes.deletes);
        }
    }

    let totals = DiffSummary::from_events(&events).totals();
    info!(
        creates = totals.creates,
        updates = totals.updates,
        deletes = totals.deletes,
        "diff computed"
    );
    Ok(events)
}

/// One kind's events. `puts` holds creates then updates.
#[derive(Default)]
struct KindChanges {
    puts: Vec<ChangeEvent>,
    deletes: Vec<ChangeEvent>,
}

#[derive(Clone, Copy)]
enum MatchBy {
    Id,
    Name,
    NaturalKey,
}

impl MatchBy {
    fn key(self, e: &Entity) -> Option<String> {
        match self {
            MatchBy::Id => e.id().map(str::to_string),
            MatchBy::Name => e.name().map(str::to_string),
            MatchBy::NaturalKey => e.natural_key(),
        }
    }
}

fn old_id(e: &ChangeEvent) -> Option<&str> {
    e.old.as_ref().and_then(Entity::id)
}

fn references(e: &Entity, kind: EntityKind, id: &str) -> bool {
    e.associations()
        .iter()
        .any(|a| a.target == kind && a.reference.and_then(|r| r.id.as_deref()) == Some(id))
}

/// Pairs one kind and records each pairing in `assigned`, so dependents
/// diffed later resolve to the ids their targets end up with.
fn diff_kind(
    kind: EntityKind,
    current: &Tables,
    desired: &Tables,
    assigned: &mut Assigned,
) -> KindChanges {
    let cur: Vec<Entity> = current
        .all(kind)
        .into_iter()
        .map(|e| {
            let mut e = e.as_ref().clone();
            resolve_references(&mut e, &[current]);
            e
        })
        .collect();
    let want: Vec<Entity> = desired
        .all(kind)
        .into_iter()
        .map(|e| {
            let mut e = e.as_ref().clone();
            resolve_desired_references(&mut e, current, desired, assigned);
            e
        })
        .collect();

    // Identity passes, strongest first. An entity matched in an earlier pass
    // is not offered to later ones.
    let mut pair: Vec<Option<usize>> = vec![None; want.len()];
    let mut taken = vec![false; cur.len()];
    for by in [MatchBy::Id, MatchBy::Name, MatchBy::NaturalKey] {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (ci, c) in cur.iter().enumerate() {
            if taken[ci] {
                continue;
            }
            if let Some(k) = by.key(c) {
                index.entry(k).or_insert(ci);
            }
        }
        for (di, d) in want.iter().enumerate() {
            if pair[di].is_some() {
                continue;
            }
            let Some(k) = by.key(d) else { continue };
            if let Some(ci) = index.remove(&k) {
                pair[di] = Some(ci);
                taken[ci] = true;
            }
        }
    }

    let mut creates = Vec::new();
    let mut updates = Vec::new();
    let mut deletes = Vec::new();
    for (d, matched) in want.into_iter().zip(pair) {
        match matched {
            None => creates.push(ChangeEvent::create(d)),
            Some(ci) => {
                let c = &cur[ci];
                if let (Some(did), Some(cid)) = (d.id(), c.id()) {
                    assigned.insert((kind, did.to_string()), cid.to_string());
                }
                if c.payload_eq(&d) {
                    continue;
                }
                let mut new = d;
                if let Some(id) = c.id() {
                    new.set_id(id);
                }
                updates.push(ChangeEvent::update(c.clone(), new));
            }
        }
    }
    for (ci, c) in cur.into_iter().enumerate() {
        if !taken[ci] {
            deletes.push(ChangeEvent::delete(c));
        }
    }

    for list in [&mut creates, &mut updates, &mut deletes] {
        list.sort_by_cached_key(ChangeEvent::identity);
    }
    debug!(
        kind = %kind,
        creates = creates.len(),
        updates = updates.len(),
        deletes = deletes.len(),
        "kind diffed"
    );
    creates.append(&mut updates);
    KindChanges {
        puts: creates,
        deletes,
    }
}

/// Orders a kind's puts so none takes a name another record still holds.
///
/// A holder that is itself renamed goes first. A holder on its way out is
/// added to `freed` and deleted in the early phase.
fn order_name_handoffs(
    kind: EntityKind,
    current: &Tables,
    changes: &mut KindChanges,
    freed: &mut BTreeSet<(EntityKind, String)>,
) -> Result<(), DiffError> {
    // name -> id of the current record holding it
    let holders: HashMap<String, String> = current
        .all(kind)
        .iter()
        .filter_map(|e| Some((e.name()?.to_string(), e.id()?.to_string())))
        .collect();
    if holders.is_empty() {
        return Ok(());
    }
    let updated: HashMap<&str, usize> = changes
        .puts
        .iter()
        .enumerate()
        .filter(|(_, e)| e.op == ChangeOp::Update)
        .filter_map(|(i, e)| Some((old_id(e)?, i)))
        .collect();
    let deleted: HashSet<&str> = changes.deletes.iter().filter_map(old_id).collect();

    let mut waits_on: Vec<Option<usize>> = vec![None; changes.puts.len()];
    for (i, ev) in changes.puts.iter().enumerate() {
        let Some(name) = ev.new.as_ref().and_then(Entity::name) else {
            continue;
        };
        let Some(holder) = holders.get(name) else { continue };
        if old_id(ev) == Some(holder.as_str()) {
            continue;
        }
        if let Some(&j) = updated.get(holder.as_str()) {
            waits_on[i] = Some(j);
        } else if deleted.contains(holder.as_str()) {
            freed.insert((kind, holder.clone()));
        } else {
            // The holder keeps the name: two desired records claim it.
            return Err(DiffError::NameCollision {
                kind,
                identity: name.to_string(),
            });
        }
    }
    if waits_on.iter().all(Option::is_none) {
        return Ok(());
    }

    let n = changes.puts.len();
    let mut placed = vec![false; n];
    let mut sequence = Vec::with_capacity(n);
    while sequence.len() < n {
        let ready = (0..n).find(|&i| !placed[i] && waits_on[i].map_or(true, |j| placed[j]));
        let Some(i) = ready else {
            let identities = (0..n)
                .filter(|&i| !placed[i])
                .map(|i| changes.puts[i].identity())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DiffError::RenameCycle { kind, identities });
        };
        placed[i] = true;
        sequence.push(i);
    }
    let mut slots: Vec<Option<ChangeEvent>> =
        std::mem::take(&mut changes.puts).into_iter().map(Some).collect();
    changes.puts = sequence.into_iter().filter_map(|i| slots[i].take()).collect();
    Ok(())
}

/// Builds the early phase for the records in `freed` and removes its events
/// from `per_kind`.
///
/// Dependents on their way out join the early deletes. Surviving dependents
/// have their update pulled forward, provided it only points at records that
/// already exist and stay, and takes no name someone else holds.
fn pull_early(
    current: &Tables,
    order: &[EntityKind],
    per_kind: &mut HashMap<EntityKind, KindChanges>,
    mut freed: BTreeSet<(EntityKind, String)>,
) -> Result<Vec<ChangeEvent>, DiffError> {
    if freed.is_empty() {
        return Ok(Vec::new());
    }

    let mut moved: BTreeSet<(EntityKind, String)> = BTreeSet::new();
    let mut queue: Vec<(EntityKind, String)> = freed.iter().cloned().collect();
    while let Some((kind, id)) = queue.pop() {
        for dk in order.iter().filter(|k| k.dependencies().contains(&kind)) {
            let Some(changes) = per_kind.get(dk) else { continue };
            for dependent in current.all(*dk) {
                let mut dependent = dependent.as_ref().clone();
                resolve_references(&mut dependent, &[current]);
                if !references(&dependent, kind, &id) {
                    continue;
                }
                let Some(did) = dependent.id().map(str::to_string) else {
                    continue;
                };
                let blocked = || DiffError::HandoffBlocked {
                    kind,
                    id: id.clone(),
                    dependent_kind: *dk,
                    dependent: dependent.identity(),
                };
                if changes.deletes.iter().any(|d| old_id(d) == Some(did.as_str())) {
                    if freed.insert((*dk, did.clone())) {
                        queue.push((*dk, did));
                    }
                    continue;
                }
                let update = changes
                    .puts
                    .iter()
                    .find(|p| p.op == ChangeOp::Update && old_id(p) == Some(did.as_str()));
                match update.and_then(|u| u.new.as_ref()) {
                    Some(new) if !references(new, kind, &id) => {
                        moved.insert((*dk, did));
                    }
                    _ => return Err(blocked()),
                }
            }
        }
    }

    for (kind, id) in &moved {
        let Some(update) = per_kind
            .get(kind)
            .and_then(|c| c.puts.iter().find(|p| old_id(p) == Some(id.as_str())))
        else {
            continue;
        };
        check_movable(current, per_kind, &freed, update)?;
    }

    let mut early = Vec::new();
    for kind in order {
        if let Some(changes) = per_kind.get_mut(kind) {
            let (pulled, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut changes.puts)
                .into_iter()
                .partition(|e| old_id(e).is_some_and(|id| moved.contains(&(*kind, id.to_string()))));
            changes.puts = rest;
            early.extend(pulled);
        }
    }
    for kind in order.iter().rev() {
        if let Some(changes) = per_kind.get_mut(kind) {
            let (pulled, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut changes.deletes)
                .into_iter()
                .partition(|e| old_id(e).is_some_and(|id| freed.contains(&(*kind, id.to_string()))));
            changes.deletes = rest;
            early.extend(pulled);
        }
    }
    debug!(events = early.len(), "early phase planned");
    Ok(early)
}

/// An update may run ahead of its kind when every record it points at is
/// already there and stays, and the name it takes is free.
fn check_movable(
    current: &Tables,
    per_kind: &HashMap<EntityKind, KindChanges>,
    freed: &BTreeSet<(EntityKind, String)>,
    update: &ChangeEvent,
) -> Result<(), DiffError> {
    let (Some(old), Some(new)) = (update.old.as_ref(), update.new.as_ref()) else {
        return Ok(());
    };
    let blocked = |kind: EntityKind, id: &str| DiffError::HandoffBlocked {
        kind,
        id: id.to_string(),
        dependent_kind: update.kind,
        dependent: new.identity(),
    };

    if let Some(name) = new.name() {
        let holder: Option<Arc<Entity>> = current.get_entity(update.kind, name).ok();
        if let Some(holder) = holder.filter(|h| h.name() == Some(name) && h.id() != old.id()) {
            return Err(blocked(update.kind, holder.id().unwrap_or_default()));
        }
    }
    for assoc in new.associations() {
        let Some(id) = assoc.reference.and_then(|r| r.id.as_deref()) else {
            continue;
        };
        let exists = current
            .get_entity(assoc.target, id)
            .is_ok_and(|t| t.id() == Some(id));
        let leaving = freed.contains(&(assoc.target, id.to_string()))
            || per_kind
                .get(&assoc.target)
                .is_some_and(|c| c.deletes.iter().any(|d| old_id(d) == Some(id)));
        if !exists || leaving {
            return Err(blocked(assoc.target, id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use gwr_schemas::{EntityRecord, ForeignRef, Plugin, Route, Service};

    use super::*;
    use crate::types::ChangeOp;

    fn svc(id: &str, name: &str) -> Service {
        Service {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    #[test]
    fn name_match_with_different_id_is_update_carrying_current_id() {
        let current = GatewayState::new();
        current.insert(svc("s1", "svc")).unwrap();
        let desired = GatewayState::new();
        let mut want = svc("other", "svc");
        want.host = Some("new.internal".into());
        desired.insert(want).unwrap();

        let events = diff(&current, &desired).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op, ChangeOp::Update);
        assert_eq!(events[0].new.as_ref().and_then(Entity::id), Some("s1"));
        assert_eq!(events[0].old.as_ref().and_then(Entity::id), Some("s1"));
    }

    #[test]
    fn id_match_wins_over_name() {
        let current = GatewayState::new();
        current.insert(svc("s1", "old-name")).unwrap();
        let desired = GatewayState::new();
        desired.insert(svc("s1", "new-name")).unwrap();

        let events = diff(&current, &desired).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op, ChangeOp::Update);
    }

    #[test]
    fn plugins_match_on_natural_key() {
        let plugin = |id: &str, enabled: bool| Plugin {
            id: Some(id.into()),
            name: "cors".into(),
            service: Some(ForeignRef::by_id("s1")),
            enabled: Some(enabled),
            ..Default::default()
        };
        let current = GatewayState::new();
        current.insert(svc("s1", "svc")).unwrap();
        current.insert(plugin("p1", true)).unwrap();
        let desired = GatewayState::new();
        desired.insert(svc("s1", "svc")).unwrap();
        desired.insert(plugin("p-new", false)).unwrap();

        let events = diff(&current, &desired).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op, ChangeOp::Update);
        assert_eq!(events[0].new.as_ref().and_then(Entity::id), Some("p1"));
    }

    #[test]
    fn duplicate_natural_key_in_desired_is_a_collision() {
        let desired = GatewayState::new();
        for id in ["p1", "p2"] {
            desired
                .insert(Plugin {
                    id: Some(id.into()),
                    name: "cors".into(),
                    ..Default::default()
                })
                .unwrap();
        }
        let err = diff(&GatewayState::new(), &desired).unwrap_err();
        assert!(matches!(err, DiffError::NameCollision { kind: EntityKind::Plugin, .. }));
    }

    #[test]
    fn creates_sorted_by_identity_within_kind() {
        let desired = GatewayState::new();
        desired.insert(svc("s2", "zeta")).unwrap();
        desired.insert(svc("s1", "alpha")).unwrap();
        let events = diff(&GatewayState::new(), &desired).unwrap();
        let names: Vec<_> = events.iter().map(ChangeEvent::identity).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn route_reference_by_name_compares_equal_to_id() {
        let current = GatewayState::new();
        current.insert(svc("s1", "svc")).unwrap();
        current
            .insert(Route {
                id: Some("r1".into()),
                name: Some("rt".into()),
                service: Some(ForeignRef::by_id("s1")),
                ..Default::default()
            })
            .unwrap();

        let desired = GatewayState::new();
        desired.insert(svc("s1", "svc")).unwrap();
        desired
            .insert_entity(
                Route {
                    id: Some("r1".into()),
                    name: Some("rt".into()),
                    service: Some(ForeignRef::by_name("svc")),
                    ..Default::default()
                }
                .into_entity(),
            )
            .unwrap();

        assert!(diff(&current, &desired).unwrap().is_empty());
    }

    fn route_to(id: &str, service: ForeignRef) -> Route {
        Route {
            id: Some(id.into()),
            name: Some(format!("{id}-rt")),
            service: Some(service),
            ..Default::default()
        }
    }

    fn apply(current: &GatewayState, events: &[ChangeEvent]) -> Result<GatewayState, gwr_state::StateError> {
        let applied = GatewayState::from_entities(current.entities())?;
        for ev in events {
            match (ev.op, &ev.old, &ev.new) {
                (ChangeOp::Create, _, Some(new)) => applied.insert_entity(new.clone())?,
                (ChangeOp::Update, _, Some(new)) => {
                    applied.update_entity(new.clone())?;
                }
                (ChangeOp::Delete, Some(old), _) => {
                    applied.delete(ev.kind, old.id().unwrap_or_default())?;
                }
                _ => {}
            }
        }
        Ok(applied)
    }

    fn ops(events: &[ChangeEvent]) -> Vec<(ChangeOp, EntityKind, String)> {
        events
            .iter()
            .map(|e| {
                let id = e.subject().and_then(Entity::id).unwrap_or_default();
                (e.op, e.kind, id.to_string())
            })
            .collect()
    }

    #[test]
    fn rename_onto_a_deleted_holder_deletes_the_holder_first() {
        let current = GatewayState::new();
        current.insert(svc("s1", "a")).unwrap();
        current.insert(svc("s2", "b")).unwrap();
        let desired = GatewayState::new();
        desired.insert(svc("s1", "b")).unwrap();

        let events = diff(&current, &desired).unwrap();
        assert_eq!(
            ops(&events),
            vec![
                (ChangeOp::Delete, EntityKind::Service, "s2".into()),
                (ChangeOp::Update, EntityKind::Service, "s1".into()),
            ]
        );
        let applied = apply(&current, &events).unwrap();
        assert_eq!(applied.get::<Service>("b").unwrap().id.as_deref(), Some("s1"));
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn dependents_of_the_holder_are_deleted_with_it() {
        let current = GatewayState::new();
        current.insert(svc("s1", "a")).unwrap();
        current.insert(svc("s2", "b")).unwrap();
        current.insert(route_to("r2", ForeignRef::by_id("s2"))).unwrap();
        let desired = GatewayState::new();
        desired.insert(svc("s1", "b")).unwrap();

        let events = diff(&current, &desired).unwrap();
        assert_eq!(
            ops(&events),
            vec![
                (ChangeOp::Delete, EntityKind::Route, "r2".into()),
                (ChangeOp::Delete, EntityKind::Service, "s2".into()),
                (ChangeOp::Update, EntityKind::Service, "s1".into()),
            ]
        );
        assert_eq!(apply(&current, &events).unwrap().len(), 1);
    }

    #[test]
    fn surviving_dependents_move_off_the_holder_first() {
        let current = GatewayState::new();
        current.insert(svc("s1", "a")).unwrap();
        current.insert(svc("s2", "b")).unwrap();
        current.insert(route_to("r1", ForeignRef::by_id("s2"))).unwrap();
        let desired = GatewayState::new();
        desired.insert(svc("s1", "b")).unwrap();
        desired.insert(route_to("r1", ForeignRef::by_name("b"))).unwrap();
        let events = diff(&current, &desired).unwrap();
        assert_eq!(
            ops(&events),
            vec![
                (ChangeOp::Update, EntityKind::Route, "r1".into()),
                (ChangeOp::Delete, EntityKind::Service, "s2".into()),
                (ChangeOp::Update, EntityKind::Service, "s1".into()),
            ]
        );
        let applied = apply(&current, &events).unwrap();
        let route = applied.get::<Route>("r1").unwrap();
        assert_eq!(route.service.as_ref().and_then(|r| r.id.as_deref()), Some("s1"));
    }

    #[test]
    fn dependent_left_on_the_holder_blocks_the_handoff() {
        let current = GatewayState::new();
        current.insert(svc("s1", "a")).unwrap();
        current.insert(svc("s2", "b")).unwrap();
        current.insert(route_to("r1", ForeignRef::by_id("s2"))).unwrap();
        let desired = GatewayState::new();
        desired.insert(svc("s1", "b")).unwrap();
        desired.insert(route_to("r1", ForeignRef::by_id("s2"))).unwrap();

        let err = diff(&current, &desired).unwrap_err();
        assert!(matches!(
            err,
            DiffError::HandoffBlocked {
                kind: EntityKind::Service,
                dependent_kind: EntityKind::Route,
                ..
            }
        ));
    }

    #[test]
    fn name_swap_is_a_rename_cycle() {
        let current = GatewayState::new();
        current.insert(svc("s1", "a")).unwrap();
        current.insert(svc("s2", "b")).unwrap();
        let desired = GatewayState::new();
        desired.insert(svc("s1", "b")).unwrap();
        desired.insert(svc("s2", "a")).unwrap();

        let err = diff(&current, &desired).unwrap_err();
        assert!(matches!(err, DiffError::RenameCycle { kind: EntityKind::Service, .. }));
    }

    #[test]
    fn rename_chain_frees_each_name_before_it_is_taken() {
        let current = GatewayState::new();
        current.insert(svc("s1", "a")).unwrap();
        current.insert(svc("s2", "b")).unwrap();
        let desired = GatewayState::new();
        desired.insert(svc("s1", "b")).unwrap();
        desired.insert(svc("s2", "c")).unwrap();
        desired.insert(svc("s3", "a")).unwrap();

        let events = diff(&current, &desired).unwrap();
        assert_eq!(
            ops(&events),
            vec![
                (ChangeOp::Update, EntityKind::Service, "s2".into()),
                (ChangeOp::Update, EntityKind::Service, "s1".into()),
                (ChangeOp::Create, EntityKind::Service, "s3".into()),
            ]
        );
        assert_eq!(apply(&current, &events).unwrap().len(), 3);
    }
}
