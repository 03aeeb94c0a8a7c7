use async_trait::async_trait;

use crate::checks::{ReferenceQuery, TableCheck};
use crate::error::AuditError;

/// One audited row: its id and the key its references are counted for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRow {
    pub id: String,
    pub reference_key: String,
}

/// Storage access the audit needs.
#[async_trait]
pub trait AuditSession: Send + Sync {
    /// Up to `limit` rows with id greater than `after`, ordered by id.
    async fn page(
        &self,
        check: &TableCheck,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AuditRow>, AuditError>;

    async fn count_references(&self, query: ReferenceQuery, key: &str) -> Result<i64, AuditError>;

    async fn delete_row(&self, check: &TableCheck, id: &str) -> Result<(), AuditError>;
}
