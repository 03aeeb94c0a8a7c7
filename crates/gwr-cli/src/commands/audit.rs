//! `audit`: orphan audit with exit codes
//! 0 clean, 2 orphan found or fixed, 3 connection error, 1 anything else.

use std::process::ExitCode;

use anyhow::Result;
use gwr_audit::{default_checks, run_audit, AuditError, AuditOptions, AuditOutcome, PgAuditSession};
use gwr_config::AuditConfig;
use tracing::warn;

use super::{EXIT_CONNECTION, EXIT_ERROR, EXIT_ORPHANS};

pub async fn audit(cfg: &AuditConfig) -> Result<ExitCode> {
    cfg.validate()?;
    if cfg.fix {
        warn!("fix mode: orphaned records will be deleted");
    }

    let session = match PgAuditSession::connect(cfg).await {
        Ok(s) => s,
        Err(e) => return Ok(report_error(&e)),
    };

    match run_audit(&session, &AuditOptions::from(cfg), &default_checks()).await {
        Ok(report) => {
            for t in &report.tables {
                println!(
                    "table={} scanned={} orphans={} deleted={}",
                    t.table,
                    t.scanned,
                    t.orphans.len(),
                    t.deleted
                );
            }
            match report.outcome {
                AuditOutcome::Clean => {
                    println!("outcome=clean");
                    Ok(ExitCode::SUCCESS)
                }
                AuditOutcome::Fixed => {
                    println!("outcome=fixed orphans={}", report.orphan_count());
                    Ok(ExitCode::from(EXIT_ORPHANS))
                }
            }
        }
        Err(e) => Ok(report_error(&e)),
    }
}

fn report_error(err: &AuditError) -> ExitCode {
    eprintln!("error: {err}");
    match err {
        AuditError::OrphanFound { .. } => {
            println!("outcome=orphan_found");
            ExitCode::from(EXIT_ORPHANS)
        }
        AuditError::Connection(_) => {
            println!("outcome=connection_error");
            ExitCode::from(EXIT_CONNECTION)
        }
        AuditError::Query { .. } | AuditError::DeleteFailed { .. } => ExitCode::from(EXIT_ERROR),
    }
}
