use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use gwr_execution::{AdminApi, AdminError, SolveError, Solver, Strategy};
use gwr_reconcile::{ChangeEvent, ChangeOp};
use gwr_schemas::{Entity, EntityKind, EntityRecord, ForeignRef, Route, Service};
use gwr_state::GatewayState;

/// Admin stand-in: stamps timestamps on create, fails on a chosen identity.
#[derive(Default)]
struct RecordingAdmin {
    records: Mutex<BTreeMap<(EntityKind, String), Entity>>,
    calls: Mutex<Vec<String>>,
    fail_identity: Option<String>,
}

impl RecordingAdmin {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AdminApi for RecordingAdmin {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn create(&self, entity: &Entity) -> Result<Entity, AdminError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("create {}", entity));
        if self.fail_identity.as_deref() == Some(entity.identity().as_str()) {
            return Err(AdminError::Http {
                status: 400,
                message: "schema violation".into(),
            });
        }
        let mut echoed = entity.clone();
        echoed.set_timestamps(Some(100), Some(100));
        let id = echoed.id().unwrap_or_default().to_string();
        self.records
            .lock()
            .unwrap()
            .insert((echoed.kind(), id), echoed.clone());
        Ok(echoed)
    }

    async fn delete(&self, entity: &Entity) -> Result<(), AdminError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete {}", entity));
        let id = entity.id().unwrap_or_default().to_string();
        match self.records.lock().unwrap().remove(&(entity.kind(), id.clone())) {
            Some(_) => Ok(()),
            None => Err(AdminError::NotFound {
                kind: entity.kind(),
                key: id,
            }),
        }
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, AdminError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, e)| e.clone())
            .collect())
    }
}

fn svc(id: &str, name: &str) -> Entity {
    Service {
        id: Some(id.into()),
        name: Some(name.into()),
        ..Default::default()
    }
    .into_entity()
}

#[tokio::test]
async fn create_writes_server_echo_back_into_current() {
    let admin = Arc::new(RecordingAdmin::default());
    let current = Arc::new(GatewayState::new());
    let solver = Solver::new(admin.clone(), current.clone());

    let report = solver
        .solve(&[ChangeEvent::create(svc("s1", "billing"))])
        .await
        .unwrap();

    assert_eq!(report.counts.creates, 1);
    assert_eq!(report.results[0].created_at(), Some(100));
    let stored = current.get::<Service>("billing").unwrap();
    assert_eq!(stored.created_at, Some(100));
}

#[tokio::test]
async fn deleting_an_absent_entity_succeeds() {
    let admin = Arc::new(RecordingAdmin::default());
    let current = Arc::new(GatewayState::new());
    let solver = Solver::new(admin.clone(), current.clone());

    let report = solver
        .solve(&[ChangeEvent::delete(svc("s1", "gone"))])
        .await
        .unwrap();
    assert_eq!(report.counts.deletes, 1);
    assert_eq!(admin.calls(), vec!["delete service:gone"]);
}

#[tokio::test]
async fn malformed_event_is_a_dispatch_error_not_a_panic() {
    let admin = Arc::new(RecordingAdmin::default());
    let solver = Solver::new(admin.clone(), Arc::new(GatewayState::new()));

    let bad = ChangeEvent {
        op: ChangeOp::Create,
        kind: EntityKind::Route,
        new: Some(svc("s1", "svc")),
        old: None,
    };
    let aborted = solver.solve(&[bad]).await.unwrap_err();
    assert!(matches!(
        aborted.error,
        SolveError::Dispatch {
            kind: EntityKind::Route,
            op: ChangeOp::Create,
            ..
        }
    ));
    assert_eq!(aborted.report.applied(), 0);
    assert!(admin.calls().is_empty());
}

#[tokio::test]
async fn remote_failure_stops_the_run_and_keeps_earlier_writes() {
    let admin = Arc::new(RecordingAdmin {
        fail_identity: Some("broken".into()),
        ..Default::default()
    });
    let current = Arc::new(GatewayState::new());
    let solver = Solver::new(admin.clone(), current.clone());

    let events = vec![
        ChangeEvent::create(svc("s1", "a")),
        ChangeEvent::create(svc("s2", "broken")),
        ChangeEvent::create(svc("s3", "c")),
    ];
    let aborted = solver.solve(&events).await.unwrap_err();

    match &aborted.error {
        SolveError::Remote {
            kind,
            identity,
            op,
            source,
        } => {
            assert_eq!(*kind, EntityKind::Service);
            assert_eq!(identity, "broken");
            assert_eq!(*op, ChangeOp::Create);
            assert!(matches!(source, AdminError::Http { status: 400, .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(aborted.report.applied(), 1);
    assert_eq!(current.len(), 1);
    assert_eq!(admin.calls().len(), 2);
}

#[tokio::test]
async fn dry_run_counts_without_calling() {
    let admin = Arc::new(RecordingAdmin::default());
    let current = Arc::new(GatewayState::new());
    let solver = Solver::new(admin.clone(), current.clone()).dry_run(true);

    let report = solver
        .solve(&[
            ChangeEvent::create(svc("s1", "a")),
            ChangeEvent::delete(svc("s2", "b")),
        ])
        .await
        .unwrap();
    assert!(report.dry_run);
    assert_eq!((report.counts.creates, report.counts.deletes), (1, 1));
    assert!(report.results.is_empty());
    assert!(admin.calls().is_empty());
    assert!(current.is_empty());
}

#[tokio::test]
async fn stop_flag_halts_before_the_next_event() {
    let admin = Arc::new(RecordingAdmin::default());
    let solver = Solver::new(admin.clone(), Arc::new(GatewayState::new()))
        .strategy(Strategy::ParallelByKind);
    solver.stop_handle().store(true, Ordering::SeqCst);

    let aborted = solver
        .solve(&[ChangeEvent::create(svc("s1", "a"))])
        .await
        .unwrap_err();
    assert!(matches!(aborted.error, SolveError::Stopped { .. }));
    assert!(admin.calls().is_empty());
}

#[tokio::test]
async fn name_only_reference_resolves_against_entities_created_earlier() {
    let admin = Arc::new(RecordingAdmin::default());
    let current = Arc::new(GatewayState::new());
    let solver = Solver::new(admin.clone(), current.clone());

    let route = Route {
        id: Some("r1".into()),
        name: Some("rt".into()),
        service: Some(ForeignRef::by_name("billing")),
        ..Default::default()
    };
    solver
        .solve(&[
            ChangeEvent::create(svc("s1", "billing")),
            ChangeEvent::create(route.into_entity()),
        ])
        .await
        .unwrap();

    let stored = current.get::<Route>("rt").unwrap();
    assert_eq!(stored.service.and_then(|s| s.id).as_deref(), Some("s1"));
    assert_eq!(current.routes_by_service_id("s1").unwrap().len(), 1);
}
