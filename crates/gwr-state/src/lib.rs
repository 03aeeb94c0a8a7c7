//! gwr-state
//!
//! In-memory, versioned, multiply-indexed snapshot store for gateway
//! entities. One [`GatewayState`] holds either the desired or the current
//! configuration; the diff engine reads two of them side by side.

mod error;
pub mod index;
pub mod schema;
mod state;
mod table;
mod txn;

pub use error::StateError;
pub use state::GatewayState;
pub use txn::{ReadTxn, Tables, WriteTxn};
