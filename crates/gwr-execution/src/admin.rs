//! Admin API boundary.
//!
//! The solver never talks HTTP itself; it drives an [`AdminApi`]. The HTTP
//! client and the in-memory paper admin both implement it.

use gwr_schemas::{Entity, EntityKind};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("{kind} `{key}` not found")]
    NotFound { kind: EntityKind, key: String },

    #[error("admin api error status={status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl AdminError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AdminError::NotFound { .. })
    }
}

/// Remote administrative API of the gateway.
///
/// `create` is create-or-replace when the entity carries an id, and returns
/// the server's authoritative copy (ids, timestamps). `delete` reports
/// [`AdminError::NotFound`] when nothing is there.
#[async_trait::async_trait]
pub trait AdminApi: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create(&self, entity: &Entity) -> Result<Entity, AdminError>;

    /// Deletes by the entity's id. The whole entity is passed because some
    /// kinds live under a parent path (targets under their upstream).
    async fn delete(&self, entity: &Entity) -> Result<(), AdminError>;

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, AdminError>;
}
