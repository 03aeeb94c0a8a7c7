use chrono::{DateTime, Utc};
use gwr_config::AuditConfig;
use serde::Serialize;
use tracing::{info, warn};

use crate::checks::{Expectation, TableCheck};
use crate::error::AuditError;
use crate::session::AuditSession;

/// Run flags, taken from [`AuditConfig`] at call time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuditOptions {
    pub fix: bool,
    pub page_size: u32,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            fix: false,
            page_size: gwr_config::DEFAULT_AUDIT_PAGE_SIZE,
        }
    }
}

impl From<&AuditConfig> for AuditOptions {
    fn from(cfg: &AuditConfig) -> Self {
        Self {
            fix: cfg.fix,
            page_size: cfg.page_size,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AuditOutcome {
    /// No orphan anywhere.
    Clean,
    /// Orphans were found and deleted.
    Fixed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Orphan {
    pub id: String,
    pub count: i64,
    pub expected: Expectation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub scanned: u64,
    pub orphans: Vec<Orphan>,
    pub deleted: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fix: bool,
    pub tables: Vec<TableReport>,
    pub outcome: AuditOutcome,
}

impl AuditReport {
    pub fn orphan_count(&self) -> usize {
        self.tables.iter().map(|t| t.orphans.len()).sum()
    }
}

/// Walks `checks` in order.
///
/// Safe mode returns [`AuditError::OrphanFound`] for the first orphan and
/// deletes nothing. Fix mode deletes each orphan and keeps going; the first
/// failed delete ends the run with [`AuditError::DeleteFailed`].
pub async fn run_audit(
    session: &dyn AuditSession,
    opts: &AuditOptions,
    checks: &[TableCheck],
) -> Result<AuditReport, AuditError> {
    let started_at = Utc::now();
    let page_size = opts.page_size.max(1);
    info!(fix = opts.fix, tables = checks.len(), page_size, "audit started");

    let mut tables = Vec::with_capacity(checks.len());
    for check in checks {
        info!(table = check.table, "checking");
        tables.push(audit_table(session, opts.fix, page_size, check).await?);
    }

    let orphans: usize = tables.iter().map(|t| t.orphans.len()).sum();
    let outcome = if orphans == 0 {
        AuditOutcome::Clean
    } else {
        AuditOutcome::Fixed
    };
    info!(?outcome, orphans, "integrity check complete");
    Ok(AuditReport {
        started_at,
        finished_at: Utc::now(),
        fix: opts.fix,
        tables,
        outcome,
    })
}

async fn audit_table(
    session: &dyn AuditSession,
    fix: bool,
    page_size: u32,
    check: &TableCheck,
) -> Result<TableReport, AuditError> {
    let mut report = TableReport {
        table: check.table.to_string(),
        scanned: 0,
        orphans: Vec::new(),
        deleted: 0,
    };

    let mut after: Option<String> = None;
    loop {
        let rows = session.page(check, after.as_deref(), page_size).await?;
        let Some(last) = rows.last() else { break };
        after = Some(last.id.clone());
        let full_page = rows.len() >= page_size as usize;

        for row in &rows {
            report.scanned += 1;
            let count = session
                .count_references(check.reference, &row.reference_key)
                .await?;
            if check.expect.holds(count) {
                continue;
            }

            warn!(table = check.table, id = %row.id, count, expected = %check.expect, "orphan");
            if !fix {
                return Err(AuditError::OrphanFound {
                    table: check.table.to_string(),
                    id: row.id.clone(),
                    count,
                    expected: check.expect,
                });
            }

            session
                .delete_row(check, &row.id)
                .await
                .map_err(|e| match e {
                    AuditError::DeleteFailed { .. } => e,
                    other => AuditError::DeleteFailed {
                        table: check.table.to_string(),
                        id: row.id.clone(),
                        message: other.to_string(),
                    },
                })?;
            info!(table = check.table, id = %row.id, "orphan deleted");
            report.deleted += 1;
            report.orphans.push(Orphan {
                id: row.id.clone(),
                count,
                expected: check.expect,
            });
        }

        if !full_page {
            break;
        }
    }
    Ok(report)
}
