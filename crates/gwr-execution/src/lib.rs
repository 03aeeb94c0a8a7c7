//! gwr-execution
//!
//! Solver: drives an ordered change-event stream through per-kind action
//! handlers against an [`AdminApi`], writing each server echo back into the
//! current store.

mod actions;
mod admin;
mod error;
mod solver;

pub use actions::{ActionRegistry, Actions, KindActions};
pub use admin::{AdminApi, AdminError};
pub use error::SolveError;
pub use solver::{SolveAborted, SolveReport, Solver, Strategy};
