//! Deleting what is already gone.
//!
//! GREEN when: a delete whose target is missing remotely still succeeds,
//! removes the record from the current store, and can be replayed.

use std::sync::Arc;

use gwr_admin_paper::PaperAdmin;
use gwr_execution::Solver;
use gwr_reconcile::diff;
use gwr_schemas::EntityKind;
use gwr_state::GatewayState;
use gwr_testkit::service;

#[tokio::test]
async fn delete_of_absent_record_succeeds_and_replays() {
    let admin = Arc::new(PaperAdmin::new());
    let current = Arc::new(GatewayState::from_entities([service("g1", "ghost", "ghost.internal")]).unwrap());
    let events = diff(&current, &GatewayState::new()).unwrap();
    assert_eq!(events.len(), 1);

    let solver = Solver::new(admin.clone(), current.clone());
    let report = solver.solve(&events).await.unwrap();
    assert_eq!(report.counts.deletes, 1);
    assert!(current.get_entity(EntityKind::Service, "g1").is_err());

    let replay = solver.solve(&events).await.unwrap();
    assert_eq!(replay.counts.deletes, 1);
    assert!(current.is_empty());
    assert!(admin.is_empty());
}
