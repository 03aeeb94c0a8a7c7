//! Command handler modules for the `gwr` binary.
//!
//! Shared loading and printing helpers live here; command logic lives in
//! the submodules.

pub mod audit;
pub mod reconcile;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gwr_admin_http::HttpAdmin;
use gwr_config::{report_unused_keys, LoadedConfig, UnusedKeyPolicy};
use gwr_execution::AdminApi;
use gwr_reconcile::{dependency_order, ChangeEvent, DiffSummary};
use gwr_state::GatewayState;

use crate::AdminArgs;

pub const EXIT_ERROR: u8 = 1;
pub const EXIT_ORPHANS: u8 = 2;
pub const EXIT_CONNECTION: u8 = 3;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Loads and merges `paths`, warning about leaves nothing reads.
pub fn load(paths: &[PathBuf]) -> Result<LoadedConfig> {
    let loaded = gwr_config::load_layered_yaml(paths)?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS unused_leaf_keys={}",
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={p}");
        }
    }
    Ok(loaded)
}

/// Desired store for `paths`, with ids taken from `current` where entities
/// already exist.
pub fn load_desired(paths: &[PathBuf], current: Option<&GatewayState>) -> Result<(LoadedConfig, GatewayState)> {
    let loaded = load(paths)?;
    let desired = gwr_config::build_desired_state(&loaded.desired()?, current)?;
    Ok((loaded, desired))
}

pub fn http_admin(args: &AdminArgs) -> Result<Arc<HttpAdmin>> {
    let admin = HttpAdmin::new_with_timeout(&args.admin_url, Duration::from_secs(args.timeout_secs))
        .context("failed to build admin client")?;
    Ok(Arc::new(admin))
}

/// Current store from everything the admin API lists.
pub async fn fetch_current(admin: &dyn AdminApi) -> Result<GatewayState> {
    let mut entities = Vec::new();
    for kind in dependency_order() {
        let listed = admin
            .list(kind)
            .await
            .with_context(|| format!("listing {kind} from {} admin", admin.name()))?;
        entities.extend(listed);
    }
    GatewayState::from_entities(entities).context("live configuration is inconsistent")
}

pub fn print_events(events: &[ChangeEvent]) {
    for ev in events {
        println!("{ev}");
    }
    let totals = DiffSummary::from_events(events).totals();
    println!(
        "creates={} updates={} deletes={}",
        totals.creates, totals.updates, totals.deletes
    );
}
