//! Failure mid-run.
//!
//! GREEN when:
//! - The first failed event stops the run and the report shows what was
//!   applied before it.
//! - Re-diffing after the failure yields only the remaining work.
//! - Once the failure clears, a second sync converges.

use std::sync::Arc;

use gwr_admin_paper::PaperAdmin;
use gwr_config::{build_desired_state, load_layered_yaml_from_strings};
use gwr_execution::{SolveError, Solver};
use gwr_reconcile::{diff, ChangeOp};
use gwr_schemas::EntityKind;
use gwr_state::GatewayState;
use gwr_testkit::{service, snapshot_admin, SHOP_YAML};

fn desired_for(current: &GatewayState) -> GatewayState {
    let loaded = load_layered_yaml_from_strings(&[SHOP_YAML]).unwrap();
    build_desired_state(&loaded.desired().unwrap(), Some(current)).unwrap()
}

#[tokio::test]
async fn failed_route_create_stops_the_run_and_leaves_remaining_work() {
    let admin = Arc::new(PaperAdmin::new());
    admin
        .seed([service("s-billing", "billing", "old.internal")])
        .unwrap();
    admin.inject_failure(EntityKind::Route, "billing-rt", "route rejected");

    let current = snapshot_admin(admin.as_ref()).await.unwrap();
    let events = diff(&current, &desired_for(&current)).unwrap();

    let aborted = Solver::new(admin.clone(), Arc::new(current))
        .solve(&events)
        .await
        .unwrap_err();
    match &aborted.error {
        SolveError::Remote { kind, identity, op, .. } => {
            assert_eq!(*kind, EntityKind::Route);
            assert_eq!(identity, "billing-rt");
            assert_eq!(*op, ChangeOp::Create);
        }
        other => panic!("unexpected error {other:?}"),
    }
    // Service, upstream and consumer events run before the first route.
    let applied = aborted.report.applied();
    assert!(applied > 0 && applied < events.len());

    let after = snapshot_admin(admin.as_ref()).await.unwrap();
    let remaining = diff(&after, &desired_for(&after)).unwrap();
    assert!(remaining
        .iter()
        .any(|e| e.kind == EntityKind::Route && e.op == ChangeOp::Create));
    assert!(remaining.iter().all(|e| e.kind != EntityKind::Service));
    assert_eq!(remaining.len(), events.len() - applied);

    admin.clear_failures();
    let current = snapshot_admin(admin.as_ref()).await.unwrap();
    let events = diff(&current, &desired_for(&current)).unwrap();
    Solver::new(admin.clone(), Arc::new(current))
        .solve(&events)
        .await
        .unwrap();

    let after = snapshot_admin(admin.as_ref()).await.unwrap();
    assert!(diff(&after, &desired_for(&after)).unwrap().is_empty());
}
