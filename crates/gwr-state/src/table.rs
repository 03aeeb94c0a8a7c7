use std::collections::HashMap;
use std::sync::Arc;

use gwr_schemas::{Entity, EntityKind};

use crate::error::StateError;
use crate::index::{IndexData, CONDITION_TRUE};
use crate::schema::{table_schema, TableSchema, ALL, ID, NAME};

/// One kind's records plus the indexes its schema declares.
///
/// Records are shared `Arc`s so cloning a table for a write transaction
/// copies pointers, not payloads.
#[derive(Clone)]
pub(crate) struct Table {
    schema: &'static TableSchema,
    records: HashMap<String, Arc<Entity>>,
    indexes: Vec<IndexData>,
}

impl Table {
    pub(crate) fn new(kind: EntityKind) -> Self {
        let schema = table_schema(kind);
        let indexes = schema
            .indexes
            .iter()
            .map(|i| IndexData::for_indexer(&i.indexer))
            .collect();
        Self {
            schema,
            records: HashMap::new(),
            indexes,
        }
    }

    pub(crate) fn kind(&self) -> EntityKind {
        self.schema.kind
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    // --------------------------------------------------------------
    // Reads
    // --------------------------------------------------------------

    /// Records filed under `value` in index `index`, in bucket order.
    pub(crate) fn lookup(&self, index: &str, value: &str) -> Result<Vec<Arc<Entity>>, StateError> {
        let pos = self
            .schema
            .position(index)
            .ok_or_else(|| StateError::UnknownIndex {
                kind: self.kind(),
                index: index.to_string(),
            })?;
        Ok(self.indexes[pos]
            .ids(value)
            .into_iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect())
    }

    /// Id index first, then name index.
    pub(crate) fn get(&self, key: &str) -> Result<Arc<Entity>, StateError> {
        let mut found = self.lookup(ID, key)?;
        if found.is_empty() && self.schema.position(NAME).is_some() {
            found = self.lookup(NAME, key)?;
        }
        found.into_iter().next().ok_or_else(|| StateError::NotFound {
            kind: self.kind(),
            key: key.to_string(),
        })
    }

    pub(crate) fn all(&self) -> Vec<Arc<Entity>> {
        self.lookup(ALL, CONDITION_TRUE).unwrap_or_default()
    }

    // --------------------------------------------------------------
    // Writes
    // --------------------------------------------------------------

    pub(crate) fn insert(&mut self, entity: Entity) -> Result<(), StateError> {
        let id = self.require_id(&entity)?;
        if self.records.contains_key(&id) {
            return Err(StateError::DuplicateKey {
                kind: self.kind(),
                index: ID,
                value: id,
            });
        }
        self.check_unique(&entity, &id)?;

        for (schema, data) in self.schema.indexes.iter().zip(self.indexes.iter_mut()) {
            if let Some(key) = schema.indexer.key(&entity) {
                data.add(key, &id);
            }
        }
        self.records.insert(id, Arc::new(entity));
        Ok(())
    }

    /// Replaces the record with the same id. Index entries whose value did
    /// not change keep their bucket position.
    pub(crate) fn update(&mut self, entity: Entity) -> Result<Arc<Entity>, StateError> {
        let id = self.require_id(&entity)?;
        let old = self
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| StateError::NotFound {
                kind: self.kind(),
                key: id.clone(),
            })?;
        self.check_unique(&entity, &id)?;

        for (schema, data) in self.schema.indexes.iter().zip(self.indexes.iter_mut()) {
            let before = schema.indexer.key(&old);
            let after = schema.indexer.key(&entity);
            if before == after {
                continue;
            }
            if let Some(before) = before {
                data.remove(&before, &id);
            }
            if let Some(after) = after {
                data.add(after, &id);
            }
        }
        self.records.insert(id, Arc::new(entity));
        Ok(old)
    }

    pub(crate) fn delete(&mut self, key: &str) -> Result<Arc<Entity>, StateError> {
        let existing = self.get(key)?;
        let id = self.require_id(&existing)?;
        for (schema, data) in self.schema.indexes.iter().zip(self.indexes.iter_mut()) {
            if let Some(value) = schema.indexer.key(&existing) {
                data.remove(&value, &id);
            }
        }
        self.records.remove(&id);
        Ok(existing)
    }

    fn require_id(&self, entity: &Entity) -> Result<String, StateError> {
        entity
            .id()
            .map(str::to_string)
            .ok_or_else(|| StateError::MissingId {
                kind: self.kind(),
                identity: entity.identity(),
            })
    }

    /// Every unique index value of `entity` must be free or already owned by
    /// `id`. Runs before any index is touched.
    fn check_unique(&self, entity: &Entity, id: &str) -> Result<(), StateError> {
        for (schema, data) in self.schema.indexes.iter().zip(self.indexes.iter()) {
            if !schema.indexer.is_unique() {
                continue;
            }
            let Some(value) = schema.indexer.key(entity) else {
                continue;
            };
            match data.owner(&value) {
                Some(owner) if owner != id => {
                    return Err(StateError::DuplicateKey {
                        kind: self.kind(),
                        index: schema.name,
                        value,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}
