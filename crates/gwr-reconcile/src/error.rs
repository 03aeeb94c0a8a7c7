use gwr_schemas::EntityKind;
use gwr_state::StateError;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    /// Two desired entities share an identity the store cannot see, such as
    /// the natural key of a target or plugin.
    #[error("desired {kind} `{identity}` is declared more than once")]
    NameCollision { kind: EntityKind, identity: String },

    /// Renames within one kind wait on each other, e.g. two records
    /// swapping names. No order of single updates applies cleanly.
    #[error("cannot order renames of {kind}: {identities} wait on each other")]
    RenameCycle { kind: EntityKind, identities: String },

    /// A record must go early to free its name, but a dependent still
    /// points at it and cannot be moved off first.
    #[error("{kind} `{id}` frees a name but {dependent_kind} `{dependent}` still references it")]
    HandoffBlocked {
        kind: EntityKind,
        id: String,
        dependent_kind: EntityKind,
        dependent: String,
    },

    #[error("snapshot lookup failed: {0}")]
    State(#[from] StateError),
}
