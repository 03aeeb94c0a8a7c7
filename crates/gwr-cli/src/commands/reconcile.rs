//! `validate`, `dump`, `diff` and `sync`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use gwr_execution::{AdminApi, Solver, Strategy};
use gwr_schemas::EntityKind;
use tracing::info;

use super::{fetch_current, http_admin, load, load_desired, print_events};
use crate::{AdminArgs, CurrentArgs};

pub fn validate(paths: &[PathBuf]) -> Result<ExitCode> {
    let (loaded, desired) = load_desired(paths, None)?;
    let snap = desired.snapshot();
    println!("config_hash={}", loaded.config_hash);
    for kind in EntityKind::ALL {
        println!("kind={} count={}", kind, snap.count(kind));
    }
    println!("entities={}", snap.len());
    Ok(ExitCode::SUCCESS)
}

pub async fn dump(args: &AdminArgs) -> Result<ExitCode> {
    let admin = http_admin(args)?;
    let current = fetch_current(admin.as_ref()).await?;
    print!("{}", gwr_config::render_yaml(current.entities())?);
    Ok(ExitCode::SUCCESS)
}

pub async fn diff(paths: &[PathBuf], args: &CurrentArgs) -> Result<ExitCode> {
    let current = match (&args.admin_url, &args.current) {
        (Some(url), _) => {
            let admin = http_admin(&AdminArgs {
                admin_url: url.clone(),
                timeout_secs: gwr_admin_http::DEFAULT_TIMEOUT.as_secs(),
            })?;
            fetch_current(admin.as_ref()).await?
        }
        (None, Some(path)) => {
            let loaded = load(std::slice::from_ref(path))?;
            gwr_config::build_desired_state(&loaded.desired()?, None)
                .with_context(|| format!("current configuration {}", path.display()))?
        }
        (None, None) => return Err(anyhow!("either --admin-url or --current is required")),
    };

    let (_, desired) = load_desired(paths, Some(&current))?;
    let events = gwr_reconcile::diff(&current, &desired)?;
    print_events(&events);
    Ok(ExitCode::SUCCESS)
}

pub async fn sync(paths: &[PathBuf], args: &AdminArgs, parallel: bool, dry_run: bool) -> Result<ExitCode> {
    let admin = http_admin(args)?;
    let current = std::sync::Arc::new(fetch_current(admin.as_ref()).await?);
    let (loaded, desired) = load_desired(paths, Some(current.as_ref()))?;
    info!(config_hash = %loaded.config_hash, admin = admin.name(), "sync");

    let events = gwr_reconcile::diff(&current, &desired)?;
    print_events(&events);

    let strategy = if parallel {
        Strategy::ParallelByKind
    } else {
        Strategy::Sequential
    };
    let solver = Solver::new(admin, current)
        .strategy(strategy)
        .dry_run(dry_run);
    match solver.solve(&events).await {
        Ok(report) => {
            println!(
                "dry_run={} applied={} creates={} updates={} deletes={}",
                report.dry_run,
                report.applied(),
                report.counts.creates,
                report.counts.updates,
                report.counts.deletes
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(aborted) => {
            println!("dry_run={} applied={}", aborted.report.dry_run, aborted.report.applied());
            Err(aborted.into())
        }
    }
}
