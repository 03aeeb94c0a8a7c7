//! Fixtures and helpers shared by the cross-crate scenario tests.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use gwr_execution::AdminApi;
use gwr_reconcile::{dependency_order, ChangeEvent, ChangeOp};
use gwr_schemas::{Entity, EntityKind, EntityRecord, ForeignRef, Plugin, Route, Service, Target, Upstream};
use gwr_state::{GatewayState, StateError};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

// Store inserts need ids; fixtures take one explicitly.

pub fn service(id: &str, name: &str, host: &str) -> Entity {
    Service {
        id: Some(id.into()),
        name: Some(name.into()),
        host: Some(host.into()),
        ..Default::default()
    }
    .into_entity()
}

pub fn route(id: &str, name: &str, service: ForeignRef, path: &str) -> Entity {
    Route {
        id: Some(id.into()),
        name: Some(name.into()),
        service: Some(service),
        paths: Some(vec![path.to_string()]),
        ..Default::default()
    }
    .into_entity()
}

pub fn upstream(id: &str, name: &str) -> Entity {
    Upstream {
        id: Some(id.into()),
        name: Some(name.into()),
        ..Default::default()
    }
    .into_entity()
}

pub fn target(id: &str, upstream: ForeignRef, addr: &str, weight: Option<u32>) -> Entity {
    Target {
        id: Some(id.into()),
        upstream: Some(upstream),
        target: addr.to_string(),
        weight,
        ..Default::default()
    }
    .into_entity()
}

pub fn service_plugin(id: &str, name: &str, service: ForeignRef, config: Value) -> Entity {
    Plugin {
        id: Some(id.into()),
        name: name.to_string(),
        service: Some(service),
        config: Some(config),
        ..Default::default()
    }
    .into_entity()
}

/// Desired configuration used by the sync scenarios: one service with a
/// route and a plugin, one upstream with two targets, one consumer.
pub const SHOP_YAML: &str = r#"
services:
  - name: billing
    host: billing.internal
    port: 8080
    routes:
      - name: billing-rt
        paths: ["/billing"]
    plugins:
      - name: rate-limiting
        config: {minute: 10}
upstreams:
  - name: pool
    targets:
      - target: 10.0.0.1:80
        weight: 100
      - target: 10.0.0.2:80
        weight: 50
consumers:
  - username: alice
"#;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Store holding everything `admin` lists, in dependency order.
pub async fn snapshot_admin(admin: &dyn AdminApi) -> Result<GatewayState> {
    let mut all = Vec::new();
    for kind in dependency_order() {
        all.extend(admin.list(kind).await.with_context(|| format!("list {kind}"))?);
    }
    Ok(GatewayState::from_entities(all)?)
}

/// Applies `events` to a copy of `current` locally, the way a remote system
/// that accepts every call would.
pub fn simulate_apply(current: &GatewayState, events: &[ChangeEvent]) -> Result<GatewayState, StateError> {
    let applied = GatewayState::from_entities(current.entities())?;
    for ev in events {
        match ev.op {
            ChangeOp::Create => {
                if let Some(new) = &ev.new {
                    applied.insert_entity(new.clone())?;
                }
            }
            ChangeOp::Update => {
                if let Some(new) = &ev.new {
                    applied.update_entity(new.clone())?;
                }
            }
            ChangeOp::Delete => {
                if let Some(id) = ev.old.as_ref().and_then(Entity::id) {
                    applied.delete(ev.kind, id)?;
                }
            }
        }
    }
    Ok(applied)
}

/// Id-free view of a store: each entity keyed by kind and identity, its
/// associations rewritten to the target's name. Two stores describing the
/// same configuration under different ids have equal views.
pub fn semantic_view(state: &GatewayState) -> BTreeMap<(EntityKind, String), Value> {
    let snap = state.snapshot();
    let mut out = BTreeMap::new();
    for e in snap.entities() {
        let mut e = e.as_ref().clone();
        for (kind, slot) in e.associations_mut() {
            let Some(r) = slot.as_mut() else { continue };
            let target_name = r
                .key()
                .and_then(|k| snap.get_entity(kind, k).ok())
                .and_then(|t| t.name().map(str::to_string));
            if let Some(name) = target_name {
                *r = ForeignRef::by_name(name);
            }
        }
        out.insert((e.kind(), e.identity()), e.payload_value());
    }
    out
}
