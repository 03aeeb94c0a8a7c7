use async_trait::async_trait;
use gwr_config::AuditConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use crate::checks::{ReferenceQuery, TableCheck};
use crate::error::AuditError;
use crate::session::{AuditRow, AuditSession};

/// [`AuditSession`] over a gateway Postgres database.
///
/// Rows are paged by id (keyset). Postgres tables are not partitioned, so
/// the partition qualifier of a check is not used.
pub struct PgAuditSession {
    pool: PgPool,
    schema: String,
}

impl PgAuditSession {
    pub async fn connect(cfg: &AuditConfig) -> Result<Self, AuditError> {
        cfg.validate()
            .map_err(|e| AuditError::Connection(format!("invalid audit configuration: {e}")))?;
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(cfg.timeout)
            .connect(cfg.database_url())
            .await
            .map_err(|e| AuditError::Connection(e.to_string()))?;
        info!(schema = %cfg.schema, env = %cfg.database_url_env, "audit database connected");
        Ok(Self::from_pool(pool, &cfg.schema))
    }

    /// `schema` must already be a valid identifier.
    pub fn from_pool(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn qualified(&self, table: &str) -> Result<String, AuditError> {
        if !is_identifier(table) || !is_identifier(&self.schema) {
            return Err(AuditError::query(table, "invalid identifier"));
        }
        Ok(format!("{}.{}", self.schema, table))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl AuditSession for PgAuditSession {
    async fn page(
        &self,
        check: &TableCheck,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AuditRow>, AuditError> {
        let table = self.qualified(check.table)?;
        if !is_identifier(check.reference_column) {
            return Err(AuditError::query(check.table, "invalid reference column"));
        }
        let sql = format!(
            r#"
            select id::text, coalesce({col}::text, '')
            from {table}
            where ($1::text is null or id::text > $1)
            order by id::text
            limit $2
            "#,
            col = check.reference_column,
        );
        let rows = sqlx::query_as::<_, (String, String)>(&sql)
            .bind(after)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AuditError::query(check.table, e))?;
        Ok(rows
            .into_iter()
            .map(|(id, reference_key)| AuditRow { id, reference_key })
            .collect())
    }

    async fn count_references(&self, query: ReferenceQuery, key: &str) -> Result<i64, AuditError> {
        let (table, sql) = match query {
            ReferenceQuery::WorkspaceEntities => {
                let t = self.qualified("workspace_entities")?;
                ("workspace_entities", format!("select count(*)::bigint from {t} where entity_id::text = $1"))
            }
            ReferenceQuery::ConsumerById => {
                let t = self.qualified("consumers")?;
                ("consumers", format!("select count(*)::bigint from {t} where id::text = $1"))
            }
        };
        let (n,) = sqlx::query_as::<_, (i64,)>(&sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AuditError::query(table, e))?;
        Ok(n)
    }

    async fn delete_row(&self, check: &TableCheck, id: &str) -> Result<(), AuditError> {
        let table = self.qualified(check.table)?;
        if let Some(partition) = check.partition {
            debug!(table = check.table, partition, "partition qualifier not applicable");
        }
        sqlx::query(&format!("delete from {table} where id::text = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AuditError::DeleteFailed {
                table: check.table.to_string(),
                id: id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
