use std::collections::HashMap;
use std::sync::Arc;

use gwr_schemas::{Entity, EntityKind, ForeignRef};
use gwr_state::Tables;

/// Desired id -> current id, for desired records paired with a current one.
pub(crate) type Assigned = HashMap<(EntityKind, String), String>;

/// Fills the missing half of each association from the given snapshots,
/// first hit wins.
///
/// A name-only reference gets the id of the entity with that name; an
/// id-only reference gets its name when the target has one. Returns how many
/// references are still without an id afterwards.
pub fn resolve_references(entity: &mut Entity, lookups: &[&Tables]) -> usize {
    let mut unresolved = 0;
    for (kind, slot) in entity.associations_mut() {
        let Some(reference) = slot.as_mut() else {
            continue;
        };
        if reference.id.is_some() && reference.name.is_some() {
            continue;
        }
        let Some(key) = reference.key().map(str::to_string) else {
            continue;
        };
        let by_id = reference.id.is_some();
        let found = lookups.iter().find_map(|t| {
            t.get_entity(kind, &key).ok().filter(|e| {
                if by_id {
                    e.id() == Some(key.as_str())
                } else {
                    e.name() == Some(key.as_str())
                }
            })
        });
        if let Some(target) = found {
            if reference.id.is_none() {
                reference.id = target.id().map(str::to_string);
            }
            if reference.name.is_none() {
                reference.name = target.name().map(str::to_string);
            }
        }
        if reference.id.is_none() {
            unresolved += 1;
        }
    }
    unresolved
}

/// Resolves a desired entity's associations to the ids their targets carry
/// once the diff is applied.
///
/// A target found in `desired` and paired with a current record resolves to
/// the current id; an unpaired one keeps its desired id. Only references to
/// records absent from `desired` are looked up in `current`.
pub(crate) fn resolve_desired_references(
    entity: &mut Entity,
    current: &Tables,
    desired: &Tables,
    assigned: &Assigned,
) -> usize {
    let mut unresolved = 0;
    for (kind, slot) in entity.associations_mut() {
        let Some(reference) = slot.as_mut() else {
            continue;
        };
        if let Some(target) = find_target(desired, kind, reference) {
            if let Some(own) = target.id() {
                let id = assigned
                    .get(&(kind, own.to_string()))
                    .map_or(own, String::as_str);
                reference.id = Some(id.to_string());
            }
            if reference.name.is_none() {
                reference.name = target.name().map(str::to_string);
            }
        } else if let Some(target) = find_target(current, kind, reference) {
            if reference.id.is_none() {
                reference.id = target.id().map(str::to_string);
            }
            if reference.name.is_none() {
                reference.name = target.name().map(str::to_string);
            }
        }
        if reference.id.is_none() {
            unresolved += 1;
        }
    }
    unresolved
}

/// The record a reference points at: by id when it carries one, else by name.
fn find_target(tables: &Tables, kind: EntityKind, reference: &ForeignRef) -> Option<Arc<Entity>> {
    if let Some(id) = reference.id.as_deref() {
        if let Some(found) = tables.get_entity(kind, id).ok().filter(|e| e.id() == Some(id)) {
            return Some(found);
        }
    }
    let name = reference.name.as_deref()?;
    tables
        .get_entity(kind, name)
        .ok()
        .filter(|e| e.name() == Some(name))
}
