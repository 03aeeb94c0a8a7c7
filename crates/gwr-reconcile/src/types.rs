use std::collections::BTreeMap;
use std::fmt;

use gwr_schemas::{Entity, EntityKind};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Create => "create",
            ChangeOp::Update => "update",
            ChangeOp::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instruction moving the current snapshot toward the desired one.
///
/// Create carries `new` only, Delete `old` only, Update both. The
/// constructors uphold that; the fields stay public so the solver can be fed
/// events from elsewhere, and it checks the shape itself.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Entity>,
}

impl ChangeEvent {
    pub fn create(new: Entity) -> Self {
        Self {
            op: ChangeOp::Create,
            kind: new.kind(),
            new: Some(new),
            old: None,
        }
    }

    pub fn update(old: Entity, new: Entity) -> Self {
        Self {
            op: ChangeOp::Update,
            kind: new.kind(),
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn delete(old: Entity) -> Self {
        Self {
            op: ChangeOp::Delete,
            kind: old.kind(),
            new: None,
            old: Some(old),
        }
    }

    /// The entity the op acts on: `new` for create/update, `old` for delete.
    pub fn subject(&self) -> Option<&Entity> {
        match self.op {
            ChangeOp::Create | ChangeOp::Update => self.new.as_ref(),
            ChangeOp::Delete => self.old.as_ref(),
        }
    }

    pub fn identity(&self) -> String {
        self.subject()
            .or(self.new.as_ref())
            .or(self.old.as_ref())
            .map(Entity::identity)
            .unwrap_or_else(|| "<empty>".to_string())
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op={} kind={} identity={}", self.op, self.kind, self.identity())?;
        if let Some(id) = self.subject().and_then(Entity::id) {
            write!(f, " id={id}")?;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------
// Summary
// ------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OpCounts {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl OpCounts {
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    pub fn record(&mut self, op: ChangeOp) {
        match op {
            ChangeOp::Create => self.creates += 1,
            ChangeOp::Update => self.updates += 1,
            ChangeOp::Delete => self.deletes += 1,
        }
    }
}

/// Per-kind op counts of an event stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub by_kind: BTreeMap<EntityKind, OpCounts>,
}

impl DiffSummary {
    pub fn from_events(events: &[ChangeEvent]) -> Self {
        let mut by_kind: BTreeMap<EntityKind, OpCounts> = BTreeMap::new();
        for e in events {
            by_kind.entry(e.kind).or_default().record(e.op);
        }
        Self { by_kind }
    }

    pub fn totals(&self) -> OpCounts {
        self.by_kind.values().fold(OpCounts::default(), |acc, c| OpCounts {
            creates: acc.creates + c.creates,
            updates: acc.updates + c.updates,
            deletes: acc.deletes + c.deletes,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.totals().total() == 0
    }
}
