//! Read and write transactions over a [`Tables`] root.
//!
//! A read transaction pins one committed root. A write transaction holds the
//! store's writer lock and a private copy of the root; `commit` publishes it,
//! dropping it without commit discards every change.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::{Arc, MutexGuard};

use gwr_schemas::{Entity, EntityKind, EntityRecord};
use tracing::trace;

use crate::error::StateError;
use crate::state::GatewayState;
use crate::table::Table;

/// Point-in-time content of a store: one table per kind plus the commit
/// counter that produced it.
#[derive(Clone)]
pub struct Tables {
    version: u64,
    tables: BTreeMap<EntityKind, Arc<Table>>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            version: 0,
            tables: EntityKind::ALL
                .into_iter()
                .map(|k| (k, Arc::new(Table::new(k))))
                .collect(),
        }
    }
}

impl Tables {
    pub fn version(&self) -> u64 {
        self.version
    }

    fn table(&self, kind: EntityKind) -> Option<&Table> {
        self.tables.get(&kind).map(Arc::as_ref)
    }

    fn table_mut(&mut self, kind: EntityKind) -> &mut Table {
        let slot = self
            .tables
            .entry(kind)
            .or_insert_with(|| Arc::new(Table::new(kind)));
        Arc::make_mut(slot)
    }

    /// `GetByIDOrName` for one kind.
    pub fn get_entity(&self, kind: EntityKind, key: &str) -> Result<Arc<Entity>, StateError> {
        match self.table(kind) {
            Some(t) => t.get(key),
            None => Err(StateError::NotFound {
                kind,
                key: key.to_string(),
            }),
        }
    }

    pub fn lookup(
        &self,
        kind: EntityKind,
        index: &str,
        value: &str,
    ) -> Result<Vec<Arc<Entity>>, StateError> {
        match self.table(kind) {
            Some(t) => t.lookup(index, value),
            None => Ok(Vec::new()),
        }
    }

    /// Full scan of one kind in insertion order.
    pub fn all(&self, kind: EntityKind) -> Vec<Arc<Entity>> {
        self.table(kind).map(Table::all).unwrap_or_default()
    }

    /// Every entity, kinds in declaration order.
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        EntityKind::ALL.into_iter().flat_map(|k| self.all(k)).collect()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.table(kind).map(Table::len).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --------------------------------------------------------------
    // Typed access
    // --------------------------------------------------------------

    pub fn get<T: EntityRecord>(&self, key: &str) -> Result<T, StateError> {
        let e = self.get_entity(T::KIND, key)?;
        cast::<T>(&e, key)
    }

    pub fn get_all<T: EntityRecord>(&self) -> Result<Vec<T>, StateError> {
        self.all(T::KIND)
            .iter()
            .map(|e| cast::<T>(e, e.id().unwrap_or_default()))
            .collect()
    }

    pub fn get_all_by_association<T: EntityRecord>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Vec<T>, StateError> {
        self.lookup(T::KIND, index, value)?
            .iter()
            .map(|e| cast::<T>(e, e.id().unwrap_or_default()))
            .collect()
    }
}

fn cast<T: EntityRecord>(e: &Entity, key: &str) -> Result<T, StateError> {
    T::from_entity(e).cloned().ok_or_else(|| StateError::AmbiguousType {
        expected: T::KIND,
        found: e.kind(),
        key: key.to_string(),
    })
}

// ------------------------------------------------------------------
// Read transaction
// ------------------------------------------------------------------

/// Consistent snapshot of a store. Later writes are invisible to it.
#[derive(Clone)]
pub struct ReadTxn {
    root: Arc<Tables>,
}

impl ReadTxn {
    pub(crate) fn new(root: Arc<Tables>) -> Self {
        Self { root }
    }
}

impl Deref for ReadTxn {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.root
    }
}

// ------------------------------------------------------------------
// Write transaction
// ------------------------------------------------------------------

pub struct WriteTxn<'a> {
    store: &'a GatewayState,
    _writer: MutexGuard<'a, ()>,
    tables: Tables,
    dirty: bool,
    committed: bool,
}

impl<'a> WriteTxn<'a> {
    pub(crate) fn new(store: &'a GatewayState, writer: MutexGuard<'a, ()>, base: &Tables) -> Self {
        Self {
            store,
            _writer: writer,
            tables: base.clone(),
            dirty: false,
            committed: false,
        }
    }

    pub fn insert(&mut self, entity: Entity) -> Result<(), StateError> {
        let kind = entity.kind();
        self.tables.table_mut(kind).insert(entity)?;
        self.dirty = true;
        Ok(())
    }

    /// Replaces the record keyed by the entity's id; returns the old record.
    pub fn update(&mut self, entity: Entity) -> Result<Arc<Entity>, StateError> {
        let kind = entity.kind();
        let old = self.tables.table_mut(kind).update(entity)?;
        self.dirty = true;
        Ok(old)
    }

    /// Update when the id is known, insert otherwise.
    pub fn upsert(&mut self, entity: Entity) -> Result<(), StateError> {
        let exists = entity.id().is_some_and(|id| {
            self.get_entity(entity.kind(), id)
                .is_ok_and(|found| found.id() == Some(id))
        });
        if exists {
            self.update(entity).map(|_| ())
        } else {
            self.insert(entity)
        }
    }

    pub fn delete(&mut self, kind: EntityKind, key: &str) -> Result<Arc<Entity>, StateError> {
        let old = self.tables.table_mut(kind).delete(key)?;
        self.dirty = true;
        Ok(old)
    }

    #[cfg(test)]
    pub(crate) fn insert_into(&mut self, kind: EntityKind, entity: Entity) -> Result<(), StateError> {
        self.tables.table_mut(kind).insert(entity)?;
        self.dirty = true;
        Ok(())
    }

    /// Publishes the transaction and returns the new store version.
    pub fn commit(mut self) -> u64 {
        self.committed = true;
        if !self.dirty {
            return self.tables.version;
        }
        let mut tables = std::mem::take(&mut self.tables);
        tables.version += 1;
        let version = tables.version;
        self.store.publish(tables);
        version
    }
}

impl Deref for WriteTxn<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.tables
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        if self.dirty && !self.committed {
            trace!(version = self.tables.version, "write transaction rolled back");
        }
    }
}
