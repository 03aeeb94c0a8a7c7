use std::fmt;

use serde::{Deserialize, Serialize};

/// Every concrete entity kind the reconciler understands.
///
/// The declaration order is also the tie-break order used when two kinds sit
/// at the same dependency level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Service,
    Route,
    Upstream,
    Target,
    Consumer,
    Plugin,
    Certificate,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Service,
        EntityKind::Route,
        EntityKind::Upstream,
        EntityKind::Target,
        EntityKind::Consumer,
        EntityKind::Plugin,
        EntityKind::Certificate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Service => "service",
            EntityKind::Route => "route",
            EntityKind::Upstream => "upstream",
            EntityKind::Target => "target",
            EntityKind::Consumer => "consumer",
            EntityKind::Plugin => "plugin",
            EntityKind::Certificate => "certificate",
        }
    }

    /// Admin API collection segment (`/services`, `/routes`, ...).
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Service => "services",
            EntityKind::Route => "routes",
            EntityKind::Upstream => "upstreams",
            EntityKind::Target => "targets",
            EntityKind::Consumer => "consumers",
            EntityKind::Plugin => "plugins",
            EntityKind::Certificate => "certificates",
        }
    }

    /// Partition qualifier for backends that store several kinds under one
    /// partitioned table. Deletes must carry it.
    pub fn partition(&self) -> Option<&'static str> {
        match self {
            EntityKind::Route => Some("routes"),
            _ => None,
        }
    }

    /// Kinds this kind may reference through an association.
    ///
    /// Hand-maintained partial order: a kind's dependencies are created
    /// before it and deleted after it.
    pub fn dependencies(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::Service
            | EntityKind::Upstream
            | EntityKind::Consumer
            | EntityKind::Certificate => &[],
            EntityKind::Route => &[EntityKind::Service],
            EntityKind::Target => &[EntityKind::Upstream],
            EntityKind::Plugin => &[EntityKind::Service, EntityKind::Route, EntityKind::Consumer],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.collection() == s)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
