//! gwr-audit
//!
//! Orphan audit for the gateway's backing store. Walks a fixed list of
//! tables, counts each row's referential associations and flags rows whose
//! count breaks the table's rule.
//!
//! - Safe mode stops at the first orphan.
//! - Fix mode deletes orphans as it finds them; a failed delete ends the run.
//!
//! Storage access goes through [`AuditSession`]. [`PgAuditSession`] talks to
//! Postgres; [`MemorySession`] holds rows in memory.

mod checks;
mod engine;
mod error;
mod memory;
mod pg;
mod session;

pub use checks::{
    default_checks, Expectation, ReferenceQuery, TableCheck, CONSUMER_WORKSPACE_REFS,
    KEYAUTH_CONSUMER_REFS, PLUGIN_WORKSPACE_REFS, ROUTE_WORKSPACE_REFS, SERVICE_WORKSPACE_REFS,
};
pub use engine::{run_audit, AuditOptions, AuditOutcome, AuditReport, Orphan, TableReport};
pub use error::AuditError;
pub use memory::MemorySession;
pub use pg::PgAuditSession;
pub use session::{AuditRow, AuditSession};
