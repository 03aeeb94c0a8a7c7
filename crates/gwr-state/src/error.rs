use gwr_schemas::EntityKind;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("duplicate {kind}: index `{index}` already holds `{value}`")]
    DuplicateKey {
        kind: EntityKind,
        index: &'static str,
        value: String,
    },

    #[error("{kind} not found: `{key}`")]
    NotFound { kind: EntityKind, key: String },

    #[error("record `{key}` in the {expected} table is a {found}")]
    AmbiguousType {
        expected: EntityKind,
        found: EntityKind,
        key: String,
    },

    #[error("{kind} `{identity}` has no id")]
    MissingId { kind: EntityKind, identity: String },

    #[error("{kind} table has no index `{index}`")]
    UnknownIndex { kind: EntityKind, index: String },
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }
}
