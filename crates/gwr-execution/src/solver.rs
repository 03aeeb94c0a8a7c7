use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use gwr_reconcile::{dependency_levels, resolve_references, ChangeEvent, ChangeOp, OpCounts};
use gwr_schemas::{Entity, EntityKind};
use gwr_state::GatewayState;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::actions::ActionRegistry;
use crate::admin::AdminApi;
use crate::error::SolveError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One event at a time, in stream order.
    #[default]
    Sequential,
    /// Kinds on the same dependency level run concurrently; each kind's own
    /// events stay in order. A run of deletes never overlaps the
    /// creates/updates around it in the stream.
    ParallelByKind,
}

/// What a solve run did. On abort it is carried inside [`SolveAborted`] so
/// partial application stays visible.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SolveReport {
    pub dry_run: bool,
    pub counts: OpCounts,
    /// Server echoes (create/update) and removed records (delete), in the
    /// order they were applied.
    pub results: Vec<Entity>,
}

impl SolveReport {
    pub fn applied(&self) -> usize {
        self.counts.total()
    }

    fn record(&mut self, op: ChangeOp, result: Option<Entity>) {
        self.counts.record(op);
        if let Some(r) = result {
            self.results.push(r);
        }
    }
}

#[derive(Debug, Error)]
#[error("solve aborted after {} applied events: {error}", .report.applied())]
pub struct SolveAborted {
    pub report: SolveReport,
    #[source]
    pub error: SolveError,
}

type StreamOutcome = (Vec<(ChangeOp, Option<Entity>)>, Option<SolveError>);

/// Applies change events through per-kind handlers and writes each result
/// back into the current store.
///
/// Failures are neither retried nor rolled back: the run stops at the first
/// failed event and reports what was applied before it.
pub struct Solver {
    registry: ActionRegistry,
    current: Arc<GatewayState>,
    strategy: Strategy,
    dry_run: bool,
    stop: Arc<AtomicBool>,
}

impl Solver {
    pub fn new(admin: Arc<dyn AdminApi>, current: Arc<GatewayState>) -> Self {
        Self::with_registry(ActionRegistry::for_admin(admin), current)
    }

    pub fn with_registry(registry: ActionRegistry, current: Arc<GatewayState>) -> Self {
        Self {
            registry,
            current,
            strategy: Strategy::default(),
            dry_run: false,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Count events without calling the admin API or touching the store.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Setting the flag stops the run before its next event.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn current(&self) -> &Arc<GatewayState> {
        &self.current
    }

    pub async fn solve(&self, events: &[ChangeEvent]) -> Result<SolveReport, SolveAborted> {
        info!(
            events = events.len(),
            strategy = ?self.strategy,
            dry_run = self.dry_run,
            "solve started"
        );
        let mut report = SolveReport {
            dry_run: self.dry_run,
            ..SolveReport::default()
        };

        let phases = match self.strategy {
            Strategy::Sequential => vec![vec![events.iter().collect::<Vec<_>>()]],
            Strategy::ParallelByKind => parallel_phases(events),
        };

        for phase in phases {
            let outcomes = join_all(phase.into_iter().map(|stream| self.run_stream(stream))).await;
            let mut failure = None;
            for (applied, error) in outcomes {
                for (op, result) in applied {
                    report.record(op, result);
                }
                if failure.is_none() {
                    failure = error;
                }
            }
            if let Some(error) = failure {
                warn!(applied = report.applied(), error = %error, "solve aborted");
                return Err(SolveAborted { report, error });
            }
        }

        info!(
            creates = report.counts.creates,
            updates = report.counts.updates,
            deletes = report.counts.deletes,
            "solve finished"
        );
        Ok(report)
    }

    async fn run_stream(&self, stream: Vec<&ChangeEvent>) -> StreamOutcome {
        let mut applied = Vec::with_capacity(stream.len());
        for event in stream {
            if self.stop.load(Ordering::SeqCst) {
                let error = SolveError::Stopped {
                    kind: event.kind,
                    identity: event.identity(),
                    op: event.op,
                };
                return (applied, Some(error));
            }
            if self.dry_run {
                debug!(%event, "dry run");
                applied.push((event.op, None));
                continue;
            }
            match self.apply_one(event).await {
                Ok(result) => applied.push((event.op, Some(result))),
                Err(error) => return (applied, Some(error)),
            }
        }
        (applied, None)
    }

    async fn apply_one(&self, event: &ChangeEvent) -> Result<Entity, SolveError> {
        debug!(%event, "applying");
        let handler = self.registry.get(event.kind).ok_or_else(|| SolveError::Dispatch {
            kind: event.kind,
            op: event.op,
            reason: "no handler registered".to_string(),
        })?;

        let state_err = |source| SolveError::State {
            kind: event.kind,
            identity: event.identity(),
            op: event.op,
            source,
        };

        match event.op {
            ChangeOp::Create | ChangeOp::Update => {
                // Dependencies created earlier in this run are in the current
                // store by now; give name-only references their ids.
                let mut resolved = event.clone();
                if let Some(new) = resolved.new.as_mut() {
                    let snapshot = self.current.read();
                    resolve_references(new, &[&*snapshot]);
                }
                if event.op == ChangeOp::Create {
                    let result = handler.create(&resolved).await?;
                    self.current.insert_entity(result.clone()).map_err(state_err)?;
                    Ok(result)
                } else {
                    let result = handler.update(&resolved).await?;
                    self.current.update_entity(result.clone()).map_err(state_err)?;
                    Ok(result)
                }
            }
            ChangeOp::Delete => {
                let old = handler.delete(event).await?;
                let key = old.id().map(str::to_string).unwrap_or_else(|| old.identity());
                match self.current.delete(old.kind(), &key) {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(state_err(e)),
                }
                Ok(old)
            }
        }
    }
}

/// Splits the stream into runs of deletes and non-deletes. A create/update
/// run goes level by level in dependency order, a delete run in reverse.
/// Each inner vector is one kind's sub-stream, in stream order.
fn parallel_phases(events: &[ChangeEvent]) -> Vec<Vec<Vec<&ChangeEvent>>> {
    let levels = dependency_levels();
    let mut phases = Vec::new();
    for run in events.chunk_by(|a, b| (a.op == ChangeOp::Delete) == (b.op == ChangeOp::Delete)) {
        if run[0].op == ChangeOp::Delete {
            for level in levels.iter().rev() {
                phases.push(kind_streams(run, level));
            }
        } else {
            for level in &levels {
                phases.push(kind_streams(run, level));
            }
        }
    }
    phases.retain(|p| !p.is_empty());
    phases
}

fn kind_streams<'a>(run: &'a [ChangeEvent], level: &[EntityKind]) -> Vec<Vec<&'a ChangeEvent>> {
    level
        .iter()
        .map(|kind| run.iter().filter(|e| e.kind == *kind).collect::<Vec<_>>())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use gwr_schemas::{EntityRecord, ForeignRef, Route, Service};

    use super::*;

    fn svc(id: &str) -> Entity {
        Service {
            id: Some(id.into()),
            name: Some(id.into()),
            ..Default::default()
        }
        .into_entity()
    }

    fn rt(id: &str, service: &str) -> Entity {
        Route {
            id: Some(id.into()),
            name: Some(id.into()),
            service: Some(ForeignRef::by_id(service)),
            ..Default::default()
        }
        .into_entity()
    }

    fn shape(phases: &[Vec<Vec<&ChangeEvent>>]) -> Vec<Vec<Vec<String>>> {
        phases
            .iter()
            .map(|phase| {
                phase
                    .iter()
                    .map(|stream| stream.iter().map(|e| format!("{} {}", e.op, e.identity())).collect())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn puts_go_down_the_levels_and_deletes_come_back_up() {
        let events = vec![
            ChangeEvent::create(svc("s1")),
            ChangeEvent::create(rt("r1", "s1")),
            ChangeEvent::delete(rt("r0", "s0")),
            ChangeEvent::delete(svc("s0")),
        ];
        assert_eq!(
            shape(&parallel_phases(&events)),
            vec![
                vec![vec!["create s1".to_string()]],
                vec![vec!["create r1".to_string()]],
                vec![vec!["delete r0".to_string()]],
                vec![vec!["delete s0".to_string()]],
            ]
        );
    }

    #[test]
    fn an_early_delete_run_stays_between_its_neighbours() {
        let events = vec![
            ChangeEvent::update(rt("r1", "s2"), rt("r1", "s1")),
            ChangeEvent::delete(svc("s2")),
            ChangeEvent::update(svc("s1"), svc("s1")),
            ChangeEvent::create(svc("s3")),
        ];
        assert_eq!(
            shape(&parallel_phases(&events)),
            vec![
                vec![vec!["update r1".to_string()]],
                vec![vec!["delete s2".to_string()]],
                vec![vec!["update s1".to_string(), "create s3".to_string()]],
            ]
        );
    }
}
