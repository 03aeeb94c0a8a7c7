use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use gwr_schemas::{Entity, EntityKind, EntityRecord, Plugin, Route, Target};
use tracing::debug;

use crate::error::StateError;
use crate::schema::{SERVICE_ID, SERVICE_NAME, UPSTREAM_ID};
use crate::txn::{ReadTxn, Tables, WriteTxn};

/// One snapshot store (desired or current) of gateway entities.
///
/// Single writer, many readers: write transactions serialize on an internal
/// mutex; readers clone the committed root and are never blocked beyond the
/// pointer swap on commit.
pub struct GatewayState {
    root: RwLock<Arc<Tables>>,
    writer: Mutex<()>,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = self.current_root();
        f.debug_struct("GatewayState")
            .field("version", &root.version())
            .field("len", &root.len())
            .finish()
    }
}

impl GatewayState {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Arc::new(Tables::default())),
            writer: Mutex::new(()),
        }
    }

    /// Builds a store from entities in one transaction. Nothing is kept if
    /// any insert fails.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Result<Self, StateError> {
        let state = Self::new();
        {
            let mut txn = state.write();
            for e in entities {
                txn.insert(e)?;
            }
            txn.commit();
        }
        Ok(state)
    }

    fn current_root(&self) -> Arc<Tables> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn publish(&self, tables: Tables) {
        let version = tables.version();
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(tables);
        debug!(version, "state committed");
    }

    // --------------------------------------------------------------
    // Transactions
    // --------------------------------------------------------------

    pub fn read(&self) -> ReadTxn {
        ReadTxn::new(self.current_root())
    }

    /// Alias of [`GatewayState::read`]; the handle stays valid across later
    /// writes.
    pub fn snapshot(&self) -> ReadTxn {
        self.read()
    }

    pub fn write(&self) -> WriteTxn<'_> {
        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.current_root();
        WriteTxn::new(self, guard, &base)
    }

    // --------------------------------------------------------------
    // Single-operation writes
    // --------------------------------------------------------------

    pub fn insert_entity(&self, entity: Entity) -> Result<(), StateError> {
        let mut txn = self.write();
        txn.insert(entity)?;
        txn.commit();
        Ok(())
    }

    pub fn update_entity(&self, entity: Entity) -> Result<Arc<Entity>, StateError> {
        let mut txn = self.write();
        let old = txn.update(entity)?;
        txn.commit();
        Ok(old)
    }

    pub fn upsert_entity(&self, entity: Entity) -> Result<(), StateError> {
        let mut txn = self.write();
        txn.upsert(entity)?;
        txn.commit();
        Ok(())
    }

    pub fn insert<T: EntityRecord>(&self, record: T) -> Result<(), StateError> {
        self.insert_entity(record.into_entity())
    }

    pub fn update<T: EntityRecord>(&self, record: T) -> Result<(), StateError> {
        self.update_entity(record.into_entity()).map(|_| ())
    }

    /// Deletes by id or name.
    pub fn delete(&self, kind: EntityKind, key: &str) -> Result<Arc<Entity>, StateError> {
        let mut txn = self.write();
        let old = txn.delete(kind, key)?;
        txn.commit();
        Ok(old)
    }

    // --------------------------------------------------------------
    // Reads
    // --------------------------------------------------------------

    pub fn get<T: EntityRecord>(&self, key: &str) -> Result<T, StateError> {
        self.read().get::<T>(key)
    }

    pub fn get_entity(&self, kind: EntityKind, key: &str) -> Result<Arc<Entity>, StateError> {
        self.read().get_entity(kind, key)
    }

    pub fn get_all<T: EntityRecord>(&self) -> Result<Vec<T>, StateError> {
        self.read().get_all::<T>()
    }

    pub fn get_all_by_association<T: EntityRecord>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Vec<T>, StateError> {
        self.read().get_all_by_association::<T>(index, value)
    }

    pub fn routes_by_service_id(&self, service_id: &str) -> Result<Vec<Route>, StateError> {
        self.get_all_by_association(SERVICE_ID, service_id)
    }

    pub fn routes_by_service_name(&self, service_name: &str) -> Result<Vec<Route>, StateError> {
        self.get_all_by_association(SERVICE_NAME, service_name)
    }

    pub fn targets_by_upstream_id(&self, upstream_id: &str) -> Result<Vec<Target>, StateError> {
        self.get_all_by_association(UPSTREAM_ID, upstream_id)
    }

    pub fn plugins_by_service_id(&self, service_id: &str) -> Result<Vec<Plugin>, StateError> {
        self.get_all_by_association(SERVICE_ID, service_id)
    }

    /// Owned copies of every entity, kinds in declaration order.
    pub fn entities(&self) -> Vec<Entity> {
        self.read()
            .entities()
            .into_iter()
            .map(|e| e.as_ref().clone())
            .collect()
    }

    pub fn version(&self) -> u64 {
        self.current_root().version()
    }

    pub fn len(&self) -> usize {
        self.current_root().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
