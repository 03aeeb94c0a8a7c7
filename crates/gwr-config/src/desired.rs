//! Typed desired configuration and its conversion into a [`GatewayState`].

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use gwr_reconcile::{dependency_order, resolve_references, validate_desired};
use gwr_schemas::{
    Certificate, Consumer, Entity, EntityKind, ForeignRef, Plugin, Route, Service, Target, Upstream,
};
use gwr_state::{GatewayState, Tables};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::secrets::resolve_env;

/// The desired configuration document. Routes and plugins may nest under
/// their service, targets under their upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesiredConfig {
    #[serde(rename = "_format_version", default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<UpstreamConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<Consumer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<CertificateConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(flatten)]
    pub service: Service,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(flatten)]
    pub upstream: Upstream,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
}

/// Certificates carry the private key by env var NAME.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub cert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DesiredConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        serde_json::from_value(config_json.clone())
            .context("configuration does not match the gateway entity schema")
    }

    /// Flat document describing `entities`, as `dump` prints it. Server
    /// timestamps are dropped and certificate keys are never written.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut out = DesiredConfig {
            format_version: Some("3.0".to_string()),
            ..Default::default()
        };
        for mut entity in entities {
            entity.set_timestamps(None, None);
            match entity {
                Entity::Service(service) => out.services.push(ServiceConfig {
                    service,
                    ..Default::default()
                }),
                Entity::Route(r) => out.routes.push(r),
                Entity::Upstream(upstream) => out.upstreams.push(UpstreamConfig {
                    upstream,
                    ..Default::default()
                }),
                Entity::Target(t) => out.targets.push(t),
                Entity::Consumer(c) => out.consumers.push(c),
                Entity::Plugin(p) => out.plugins.push(p),
                Entity::Certificate(c) => {
                    warn!(id = ?c.id, "certificate key omitted from output");
                    out.certificates.push(CertificateConfig {
                        id: c.id,
                        cert: c.cert,
                        key_env: None,
                        tags: c.tags,
                    })
                }
            }
        }
        out
    }

    /// Every entity in the document, nested ones flattened with their
    /// parent association filled in.
    pub fn entities(&self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Vec<Entity>> {
        let mut out = Vec::new();

        for svc in &self.services {
            out.push(Entity::Service(svc.service.clone()));
            if svc.routes.is_empty() && svc.plugins.is_empty() {
                continue;
            }
            let parent = parent_ref(svc.service.id.as_deref(), svc.service.name.as_deref(), "service")?;
            for route in &svc.routes {
                let mut route = route.clone();
                attach(&mut route.service, &parent, "route", route.name.as_deref())?;
                out.push(Entity::Route(route));
            }
            for plugin in &svc.plugins {
                let mut plugin = plugin.clone();
                attach(&mut plugin.service, &parent, "plugin", Some(&plugin.name))?;
                out.push(Entity::Plugin(plugin));
            }
        }
        out.extend(self.routes.iter().cloned().map(Entity::Route));

        for up in &self.upstreams {
            out.push(Entity::Upstream(up.upstream.clone()));
            if up.targets.is_empty() {
                continue;
            }
            let parent = parent_ref(up.upstream.id.as_deref(), up.upstream.name.as_deref(), "upstream")?;
            for target in &up.targets {
                let mut target = target.clone();
                attach(&mut target.upstream, &parent, "target", Some(&target.target))?;
                out.push(Entity::Target(target));
            }
        }
        out.extend(self.targets.iter().cloned().map(Entity::Target));
        out.extend(self.consumers.iter().cloned().map(Entity::Consumer));
        out.extend(self.plugins.iter().cloned().map(Entity::Plugin));

        for cert in &self.certificates {
            let Some(var) = cert.key_env.as_deref() else {
                bail!(
                    "certificate {} has no key_env",
                    cert.id.as_deref().unwrap_or("<unnamed>")
                );
            };
            let Some(key) = lookup(var) else {
                bail!("CERT_KEY_MISSING env={var}");
            };
            out.push(Entity::Certificate(Certificate {
                id: cert.id.clone(),
                cert: cert.cert.clone(),
                key,
                tags: cert.tags.clone(),
                ..Default::default()
            }));
        }
        Ok(out)
    }
}

fn parent_ref(id: Option<&str>, name: Option<&str>, what: &str) -> Result<ForeignRef> {
    if id.is_none() && name.is_none() {
        bail!("a {what} with nested entities needs an id or a name");
    }
    Ok(ForeignRef {
        id: id.map(str::to_string),
        name: name.map(str::to_string),
    })
}

fn attach(slot: &mut Option<ForeignRef>, parent: &ForeignRef, what: &str, label: Option<&str>) -> Result<()> {
    match slot {
        Some(existing) if !existing.same_target(parent) => bail!(
            "nested {what} `{}` names a different parent than the one it is nested under",
            label.unwrap_or("<unnamed>")
        ),
        _ => {
            *slot = Some(parent.clone());
            Ok(())
        }
    }
}

/// First association still lacking an id: `(field, key)`.
fn first_unresolved(entity: &Entity) -> Option<(&'static str, String)> {
    entity.associations().into_iter().find_map(|a| {
        let r = a.reference?;
        r.id.is_none()
            .then(|| (a.field, r.key().unwrap_or("<empty>").to_string()))
    })
}

/// Id of the current entity `entity` stands for: same name, else same
/// natural key.
fn matching_id(current: &Tables, entity: &Entity) -> Option<String> {
    let kind = entity.kind();
    if let Some(name) = entity.name() {
        return current
            .get_entity(kind, name)
            .ok()
            .filter(|e| e.name() == Some(name))
            .and_then(|e| e.id().map(str::to_string));
    }
    let key = entity.natural_key()?;
    current
        .all(kind)
        .into_iter()
        .find(|e| e.natural_key().as_deref() == Some(key.as_str()))
        .and_then(|e| e.id().map(str::to_string))
}

/// Builds the desired store, reading certificate keys from the process
/// environment.
pub fn build_desired_state(config: &DesiredConfig, current: Option<&GatewayState>) -> Result<GatewayState> {
    build_desired_state_with_env(config, current, resolve_env)
}

/// Builds the desired store in dependency order.
///
/// - References must resolve within the desired configuration.
/// - An entity without an id takes the id of its current counterpart (same
///   name or natural key) when `current` is given, else a fresh UUIDv4.
/// - Duplicate ids, names or natural keys are errors.
pub fn build_desired_state_with_env(
    config: &DesiredConfig,
    current: Option<&GatewayState>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<GatewayState> {
    let mut by_kind: BTreeMap<EntityKind, Vec<Entity>> = BTreeMap::new();
    for e in config.entities(&lookup)? {
        by_kind.entry(e.kind()).or_default().push(e);
    }

    let current_snap = current.map(GatewayState::snapshot);
    let state = GatewayState::new();
    {
        let mut txn = state.write();
        for kind in dependency_order() {
            for mut entity in by_kind.remove(&kind).unwrap_or_default() {
                resolve_references(&mut entity, &[&*txn]);
                if let Some((field, key)) = first_unresolved(&entity) {
                    bail!(
                        "{kind} `{}` references {field} `{key}` which is not in the desired configuration",
                        entity.identity()
                    );
                }
                if entity.id().is_none() {
                    let id = current_snap
                        .as_deref()
                        .and_then(|cur| matching_id(cur, &entity))
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    entity.set_id(id);
                }
                debug!(entity = %entity, "desired");
                let identity = entity.identity();
                txn.insert(entity)
                    .with_context(|| format!("desired {kind} `{identity}`"))?;
            }
        }
        txn.commit();
    }

    validate_desired(&state.snapshot()).context("desired configuration is inconsistent")?;
    info!(entities = state.len(), "desired state built");
    Ok(state)
}

/// YAML for `entities` in the desired-configuration format.
pub fn render_yaml(entities: impl IntoIterator<Item = Entity>) -> Result<String> {
    serde_yaml::to_string(&DesiredConfig::from_entities(entities)).context("yaml serialize failed")
}

#[cfg(test)]
mod tests {
    use gwr_schemas::EntityRecord;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(yaml: &str) -> DesiredConfig {
        let v: Value = serde_yaml::from_str(yaml).unwrap();
        DesiredConfig::from_json(&v).unwrap()
    }

    #[test]
    fn nested_routes_and_targets_get_their_parent() {
        let cfg = parse(
            r#"
services:
  - name: billing
    host: billing.internal
    routes:
      - name: billing-rt
        paths: ["/billing"]
upstreams:
  - name: pool
    targets:
      - target: 10.0.0.1:80
"#,
        );
        let entities = cfg.entities(&no_env).unwrap();
        assert_eq!(entities.len(), 4);
        let Entity::Route(r) = &entities[1] else { panic!("route expected") };
        assert_eq!(r.service, Some(ForeignRef::by_name("billing")));
        let Entity::Target(t) = &entities[3] else { panic!("target expected") };
        assert_eq!(t.upstream, Some(ForeignRef::by_name("pool")));
    }

    #[test]
    fn nested_route_naming_another_service_is_rejected() {
        let cfg = parse(
            r#"
services:
  - name: billing
    routes:
      - name: rt
        service: orders
"#,
        );
        assert!(cfg.entities(&no_env).is_err());
    }

    #[test]
    fn build_resolves_names_and_assigns_ids() {
        let cfg = parse(
            r#"
services:
  - name: billing
routes:
  - name: rt
    service: billing
"#,
        );
        let state = build_desired_state_with_env(&cfg, None, no_env).unwrap();
        let svc: Service = state.get("billing").unwrap();
        let rt: Route = state.get("rt").unwrap();
        assert!(svc.id.is_some());
        assert_eq!(rt.service.and_then(|s| s.id), svc.id);
    }

    #[test]
    fn ids_come_from_current_counterparts() {
        let current = GatewayState::from_entities([
            Service {
                id: Some("s-live".into()),
                name: Some("billing".into()),
                ..Default::default()
            }
            .into_entity(),
            Upstream {
                id: Some("u-live".into()),
                name: Some("pool".into()),
                ..Default::default()
            }
            .into_entity(),
            Target {
                id: Some("t-live".into()),
                upstream: Some(ForeignRef::by_id("u-live")),
                target: "10.0.0.1:80".into(),
                ..Default::default()
            }
            .into_entity(),
        ])
        .unwrap();
        let cfg = parse(
            r#"
services:
  - name: billing
upstreams:
  - name: pool
    targets:
      - target: 10.0.0.1:80
"#,
        );
        let desired = build_desired_state_with_env(&cfg, Some(&current), no_env).unwrap();
        assert_eq!(desired.get::<Service>("billing").unwrap().id.as_deref(), Some("s-live"));
        assert!(desired.get::<Target>("t-live").is_ok());
    }

    #[test]
    fn dangling_reference_fails_the_build() {
        let cfg = parse(
            r#"
routes:
  - name: rt
    service: ghost
"#,
        );
        let err = build_desired_state_with_env(&cfg, None, no_env).unwrap_err();
        assert!(err.to_string().contains("ghost"), "{err}");
    }

    #[test]
    fn certificate_key_comes_from_the_named_variable() {
        let cfg = parse(
            r#"
certificates:
  - id: c1
    cert: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----"
    key_env: EDGE_KEY
"#,
        );
        let err = build_desired_state_with_env(&cfg, None, no_env).unwrap_err();
        assert!(err.to_string().contains("env=EDGE_KEY"));

        let state = build_desired_state_with_env(&cfg, None, |name: &str| {
            (name == "EDGE_KEY").then(|| "private".to_string())
        })
        .unwrap();
        let cert: Certificate = state.get("c1").unwrap();
        assert_eq!(cert.key, "private");
    }

    #[test]
    fn rendered_yaml_never_contains_key_material() {
        let yaml = render_yaml([Certificate {
            id: Some("c1".into()),
            cert: "CERT".into(),
            key: "very-private".into(),
            created_at: Some(1),
            ..Default::default()
        }
        .into_entity()])
        .unwrap();
        assert!(!yaml.contains("very-private"));
        assert!(!yaml.contains("created_at"));
        assert!(yaml.contains("c1"));
    }
}
