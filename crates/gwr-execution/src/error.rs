use gwr_reconcile::ChangeOp;
use gwr_schemas::EntityKind;
use gwr_state::StateError;
use thiserror::Error;

use crate::admin::AdminError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SolveError {
    /// An event reached a handler it does not fit. Fatal to the event, never
    /// to the process.
    #[error("cannot dispatch {op} for {kind}: {reason}")]
    Dispatch {
        kind: EntityKind,
        op: ChangeOp,
        reason: String,
    },

    #[error("{op} {kind} `{identity}` failed: {source}")]
    Remote {
        kind: EntityKind,
        identity: String,
        op: ChangeOp,
        #[source]
        source: AdminError,
    },

    #[error("write-back of {op} {kind} `{identity}` failed: {source}")]
    State {
        kind: EntityKind,
        identity: String,
        op: ChangeOp,
        #[source]
        source: StateError,
    },

    #[error("stopped before {op} {kind} `{identity}`")]
    Stopped {
        kind: EntityKind,
        identity: String,
        op: ChangeOp,
    },
}
