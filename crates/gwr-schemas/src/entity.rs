use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::foreign::{same_optional_target, ForeignRef};
use crate::kind::EntityKind;

// ------------------------------------------------------------------
// Concrete kinds
// ------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ForeignRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_path: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_host: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<ForeignRef>,
    /// `host:port` the upstream balances onto.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// A plugin with no service, route or consumer is global.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ForeignRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<ForeignRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<ForeignRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub cert: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

// Private key material never reaches logs.
impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("id", &self.id)
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .field("key", &"<redacted>")
            .field("tags", &self.tags)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

// ------------------------------------------------------------------
// Closed union
// ------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Service(Service),
    Route(Route),
    Upstream(Upstream),
    Target(Target),
    Consumer(Consumer),
    Plugin(Plugin),
    Certificate(Certificate),
}

/// One association slot of an entity: the field it lives in, the kind it
/// points at and the reference itself when set.
#[derive(Clone, Copy, Debug)]
pub struct Association<'a> {
    pub field: &'static str,
    pub target: EntityKind,
    pub reference: Option<&'a ForeignRef>,
}

macro_rules! each_variant {
    ($value:expr, $e:ident => $body:expr) => {
        match $value {
            Entity::Service($e) => $body,
            Entity::Route($e) => $body,
            Entity::Upstream($e) => $body,
            Entity::Target($e) => $body,
            Entity::Consumer($e) => $body,
            Entity::Plugin($e) => $body,
            Entity::Certificate($e) => $body,
        }
    };
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Service(_) => EntityKind::Service,
            Entity::Route(_) => EntityKind::Route,
            Entity::Upstream(_) => EntityKind::Upstream,
            Entity::Target(_) => EntityKind::Target,
            Entity::Consumer(_) => EntityKind::Consumer,
            Entity::Plugin(_) => EntityKind::Plugin,
            Entity::Certificate(_) => EntityKind::Certificate,
        }
    }

    pub fn id(&self) -> Option<&str> {
        each_variant!(self, e => e.id.as_deref())
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        each_variant!(self, e => e.id = Some(id))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    /// Unique human-readable name, for kinds that have one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Entity::Service(e) => e.name.as_deref(),
            Entity::Route(e) => e.name.as_deref(),
            Entity::Upstream(e) => e.name.as_deref(),
            Entity::Consumer(e) => e.username.as_deref(),
            Entity::Target(_) | Entity::Plugin(_) | Entity::Certificate(_) => None,
        }
    }

    /// Payload-derived identity for kinds without a unique name.
    ///
    /// Association parts use the reference key (id first), so both sides of
    /// a comparison must have had their references resolved.
    pub fn natural_key(&self) -> Option<String> {
        fn part(r: Option<&ForeignRef>) -> &str {
            r.and_then(ForeignRef::key).unwrap_or("")
        }
        match self {
            Entity::Target(t) => Some(format!("{}|{}", part(t.upstream.as_ref()), t.target)),
            Entity::Plugin(p) => Some(format!(
                "{}|{}|{}|{}",
                p.name,
                part(p.service.as_ref()),
                part(p.route.as_ref()),
                part(p.consumer.as_ref())
            )),
            Entity::Certificate(c) => Some(c.cert.trim().to_string()),
            _ => None,
        }
    }

    /// Stable label used for ordering and messages: name, then natural key,
    /// then id.
    pub fn identity(&self) -> String {
        if let Some(name) = self.name() {
            return name.to_string();
        }
        if let Entity::Certificate(_) = self {
            // PEM bodies are long; the id is a better label once assigned.
            if let Some(id) = self.id() {
                return id.to_string();
            }
        }
        self.natural_key()
            .or_else(|| self.id().map(str::to_string))
            .unwrap_or_else(|| "<anonymous>".to_string())
    }

    pub fn created_at(&self) -> Option<i64> {
        each_variant!(self, e => e.created_at)
    }

    pub fn updated_at(&self) -> Option<i64> {
        each_variant!(self, e => e.updated_at)
    }

    pub fn set_timestamps(&mut self, created_at: Option<i64>, updated_at: Option<i64>) {
        each_variant!(self, e => {
            e.created_at = created_at;
            e.updated_at = updated_at;
        })
    }

    pub fn associations(&self) -> Vec<Association<'_>> {
        match self {
            Entity::Route(r) => vec![Association {
                field: "service",
                target: EntityKind::Service,
                reference: r.service.as_ref(),
            }],
            Entity::Target(t) => vec![Association {
                field: "upstream",
                target: EntityKind::Upstream,
                reference: t.upstream.as_ref(),
            }],
            Entity::Plugin(p) => vec![
                Association {
                    field: "service",
                    target: EntityKind::Service,
                    reference: p.service.as_ref(),
                },
                Association {
                    field: "route",
                    target: EntityKind::Route,
                    reference: p.route.as_ref(),
                },
                Association {
                    field: "consumer",
                    target: EntityKind::Consumer,
                    reference: p.consumer.as_ref(),
                },
            ],
            Entity::Service(_) | Entity::Upstream(_) | Entity::Consumer(_) | Entity::Certificate(_) => {
                Vec::new()
            }
        }
    }

    pub fn associations_mut(&mut self) -> Vec<(EntityKind, &mut Option<ForeignRef>)> {
        match self {
            Entity::Route(r) => vec![(EntityKind::Service, &mut r.service)],
            Entity::Target(t) => vec![(EntityKind::Upstream, &mut t.upstream)],
            Entity::Plugin(p) => vec![
                (EntityKind::Service, &mut p.service),
                (EntityKind::Route, &mut p.route),
                (EntityKind::Consumer, &mut p.consumer),
            ],
            Entity::Service(_) | Entity::Upstream(_) | Entity::Consumer(_) | Entity::Certificate(_) => {
                Vec::new()
            }
        }
    }

    /// Field-by-field payload comparison.
    ///
    /// Ids and server timestamps are ignored; associations compare through
    /// [`ForeignRef::same_target`].
    pub fn payload_eq(&self, other: &Entity) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        let refs_match = self
            .associations()
            .iter()
            .zip(other.associations().iter())
            .all(|(a, b)| same_optional_target(a.reference, b.reference));
        refs_match && self.stripped() == other.stripped()
    }

    /// Copy with id, timestamps and association contents cleared. Presence of
    /// an association is kept; its target is compared separately.
    fn stripped(&self) -> Entity {
        let mut e = self.clone();
        each_variant!(&mut e, inner => {
            inner.id = None;
            inner.created_at = None;
            inner.updated_at = None;
        });
        for (_, slot) in e.associations_mut() {
            if slot.is_some() {
                *slot = Some(ForeignRef::default());
            }
        }
        e
    }

    /// Payload as JSON without the `kind` tag, id or timestamps.
    pub fn payload_value(&self) -> Value {
        let mut e = self.clone();
        each_variant!(&mut e, inner => {
            inner.id = None;
            inner.created_at = None;
            inner.updated_at = None;
        });
        each_variant!(&e, inner => serde_json::to_value(inner).unwrap_or(Value::Null))
    }

    /// Untagged JSON (as the admin API returns it) into a typed entity.
    pub fn from_kind_value(kind: EntityKind, value: Value) -> Result<Entity, serde_json::Error> {
        Ok(match kind {
            EntityKind::Service => Entity::Service(serde_json::from_value(value)?),
            EntityKind::Route => Entity::Route(serde_json::from_value(value)?),
            EntityKind::Upstream => Entity::Upstream(serde_json::from_value(value)?),
            EntityKind::Target => Entity::Target(serde_json::from_value(value)?),
            EntityKind::Consumer => Entity::Consumer(serde_json::from_value(value)?),
            EntityKind::Plugin => Entity::Plugin(serde_json::from_value(value)?),
            EntityKind::Certificate => Entity::Certificate(serde_json::from_value(value)?),
        })
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.identity())
    }
}

// ------------------------------------------------------------------
// Typed access
// ------------------------------------------------------------------

/// A concrete kind that can be lifted into and recovered from [`Entity`].
pub trait EntityRecord: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn into_entity(self) -> Entity;

    fn from_entity(entity: &Entity) -> Option<&Self>;
}

macro_rules! entity_record {
    ($ty:ident) => {
        impl EntityRecord for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn into_entity(self) -> Entity {
                Entity::$ty(self)
            }

            fn from_entity(entity: &Entity) -> Option<&Self> {
                match entity {
                    Entity::$ty(e) => Some(e),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Entity {
            fn from(value: $ty) -> Self {
                Entity::$ty(value)
            }
        }
    };
}

entity_record!(Service);
entity_record!(Route);
entity_record!(Upstream);
entity_record!(Target);
entity_record!(Consumer);
entity_record!(Plugin);
entity_record!(Certificate);
