use thiserror::Error;

use crate::checks::Expectation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query on {table} failed: {message}")]
    Query { table: String, message: String },

    #[error("orphaned {table}: {id} ({count} references, expected {expected})")]
    OrphanFound {
        table: String,
        id: String,
        count: i64,
        expected: Expectation,
    },

    #[error("error while deleting {table}: {id}: {message}")]
    DeleteFailed {
        table: String,
        id: String,
        message: String,
    },
}

impl AuditError {
    pub(crate) fn query(table: &str, message: impl ToString) -> Self {
        AuditError::Query {
            table: table.to_string(),
            message: message.to_string(),
        }
    }
}
