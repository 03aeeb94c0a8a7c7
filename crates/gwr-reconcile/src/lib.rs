//! gwr-reconcile
//!
//! Diff engine: compares a current and a desired [`gwr_state::GatewayState`]
//! and emits the ordered create/update/delete stream that moves one to the
//! other.
//!
//! - Deterministic output (identity-sorted within a kind, fixed kind order).
//! - A unique name is freed before it is taken; renames that cannot be
//!   ordered that way are refused before any event is emitted.
//! - Pure: never mutates either store.

mod engine;
mod error;
mod order;
mod resolve;
mod types;

pub use engine::{diff, diff_snapshots, validate_desired};
pub use error::DiffError;
pub use order::{dependency_levels, dependency_order};
pub use resolve::resolve_references;
pub use types::{ChangeEvent, ChangeOp, DiffSummary, OpCounts};
