use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::checks::{ReferenceQuery, TableCheck};
use crate::error::AuditError;
use crate::session::{AuditRow, AuditSession};

#[derive(Default)]
struct Inner {
    /// table -> id -> reference key
    tables: BTreeMap<String, BTreeMap<String, String>>,
    /// entity id -> workspace_entities rows
    workspace_refs: BTreeMap<String, i64>,
    failing_deletes: BTreeSet<(String, String)>,
    deleted: Vec<(String, String)>,
}

/// In-memory [`AuditSession`].
#[derive(Default)]
pub struct MemorySession {
    inner: Mutex<Inner>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a row whose references are counted for its own id.
    pub fn with_row(self, table: &str, id: &str) -> Self {
        self.with_keyed_row(table, id, id)
    }

    pub fn with_keyed_row(self, table: &str, id: &str, reference_key: &str) -> Self {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), reference_key.to_string());
        self
    }

    pub fn with_workspace_refs(self, entity_id: &str, count: i64) -> Self {
        self.lock()
            .workspace_refs
            .insert(entity_id.to_string(), count);
        self
    }

    /// Makes deleting `(table, id)` fail.
    pub fn with_failing_delete(self, table: &str, id: &str) -> Self {
        self.lock()
            .failing_deletes
            .insert((table.to_string(), id.to_string()));
        self
    }

    /// Ids left in `table`, ordered.
    pub fn rows(&self, table: &str) -> Vec<String> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `(table, id)` of every successful delete, in order.
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.lock().deleted.clone()
    }
}

#[async_trait]
impl AuditSession for MemorySession {
    async fn page(
        &self,
        check: &TableCheck,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AuditRow>, AuditError> {
        let inner = self.lock();
        let Some(rows) = inner.tables.get(check.table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|(id, _)| after.map_or(true, |a| id.as_str() > a))
            .take(limit as usize)
            .map(|(id, key)| AuditRow {
                id: id.clone(),
                reference_key: key.clone(),
            })
            .collect())
    }

    async fn count_references(&self, query: ReferenceQuery, key: &str) -> Result<i64, AuditError> {
        let inner = self.lock();
        Ok(match query {
            ReferenceQuery::WorkspaceEntities => inner.workspace_refs.get(key).copied().unwrap_or(0),
            ReferenceQuery::ConsumerById => inner
                .tables
                .get("consumers")
                .map_or(0, |rows| i64::from(rows.contains_key(key))),
        })
    }

    async fn delete_row(&self, check: &TableCheck, id: &str) -> Result<(), AuditError> {
        let mut inner = self.lock();
        let key = (check.table.to_string(), id.to_string());
        if inner.failing_deletes.contains(&key) {
            return Err(AuditError::DeleteFailed {
                table: key.0,
                id: key.1,
                message: "injected failure".to_string(),
            });
        }
        if let Some(rows) = inner.tables.get_mut(check.table) {
            rows.remove(id);
        }
        inner.deleted.push(key);
        Ok(())
    }
}
