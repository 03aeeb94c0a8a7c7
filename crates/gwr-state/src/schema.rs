//! Static table schemas, one per entity kind.

use gwr_schemas::{Entity, EntityKind, ForeignRef};

use crate::index::{IndexSchema, Indexer};

pub const ID: &str = "id";
pub const NAME: &str = "name";
pub const ALL: &str = "all";
pub const SERVICE_ID: &str = "service.id";
pub const SERVICE_NAME: &str = "service.name";
pub const UPSTREAM_ID: &str = "upstream.id";
pub const UPSTREAM_NAME: &str = "upstream.name";
pub const ROUTE_ID: &str = "route.id";
pub const CONSUMER_ID: &str = "consumer.id";

pub struct TableSchema {
    pub kind: EntityKind,
    pub indexes: &'static [IndexSchema],
}

impl TableSchema {
    pub fn position(&self, index: &str) -> Option<usize> {
        self.indexes.iter().position(|i| i.name == index)
    }
}

fn id_of(e: &Entity) -> Option<String> {
    e.id().map(str::to_string)
}

fn name_of(e: &Entity) -> Option<String> {
    e.name().map(str::to_string)
}

fn always(_: &Entity) -> bool {
    true
}

fn ref_id(r: Option<&ForeignRef>) -> Option<String> {
    r.and_then(|r| r.id.clone())
}

fn ref_name(r: Option<&ForeignRef>) -> Option<String> {
    r.and_then(|r| r.name.clone())
}

fn service_id(e: &Entity) -> Option<String> {
    match e {
        Entity::Route(r) => ref_id(r.service.as_ref()),
        Entity::Plugin(p) => ref_id(p.service.as_ref()),
        _ => None,
    }
}

fn service_name(e: &Entity) -> Option<String> {
    match e {
        Entity::Route(r) => ref_name(r.service.as_ref()),
        Entity::Plugin(p) => ref_name(p.service.as_ref()),
        _ => None,
    }
}

fn upstream_id(e: &Entity) -> Option<String> {
    match e {
        Entity::Target(t) => ref_id(t.upstream.as_ref()),
        _ => None,
    }
}

fn upstream_name(e: &Entity) -> Option<String> {
    match e {
        Entity::Target(t) => ref_name(t.upstream.as_ref()),
        _ => None,
    }
}

fn route_id(e: &Entity) -> Option<String> {
    match e {
        Entity::Plugin(p) => ref_id(p.route.as_ref()),
        _ => None,
    }
}

fn consumer_id(e: &Entity) -> Option<String> {
    match e {
        Entity::Plugin(p) => ref_id(p.consumer.as_ref()),
        _ => None,
    }
}

const fn unique(name: &'static str, f: fn(&Entity) -> Option<String>) -> IndexSchema {
    IndexSchema {
        name,
        indexer: Indexer::Unique(f),
    }
}

const fn association(name: &'static str, f: fn(&Entity) -> Option<String>) -> IndexSchema {
    IndexSchema {
        name,
        indexer: Indexer::Association(f),
    }
}

const ALL_INDEX: IndexSchema = IndexSchema {
    name: ALL,
    indexer: Indexer::Conditional(always),
};

static SERVICES: TableSchema = TableSchema {
    kind: EntityKind::Service,
    indexes: &[unique(ID, id_of), unique(NAME, name_of), ALL_INDEX],
};

static ROUTES: TableSchema = TableSchema {
    kind: EntityKind::Route,
    indexes: &[
        unique(ID, id_of),
        unique(NAME, name_of),
        association(SERVICE_ID, service_id),
        association(SERVICE_NAME, service_name),
        ALL_INDEX,
    ],
};

static UPSTREAMS: TableSchema = TableSchema {
    kind: EntityKind::Upstream,
    indexes: &[unique(ID, id_of), unique(NAME, name_of), ALL_INDEX],
};

static TARGETS: TableSchema = TableSchema {
    kind: EntityKind::Target,
    indexes: &[
        unique(ID, id_of),
        association(UPSTREAM_ID, upstream_id),
        association(UPSTREAM_NAME, upstream_name),
        ALL_INDEX,
    ],
};

static CONSUMERS: TableSchema = TableSchema {
    kind: EntityKind::Consumer,
    indexes: &[unique(ID, id_of), unique(NAME, name_of), ALL_INDEX],
};

static PLUGINS: TableSchema = TableSchema {
    kind: EntityKind::Plugin,
    indexes: &[
        unique(ID, id_of),
        association(SERVICE_ID, service_id),
        association(SERVICE_NAME, service_name),
        association(ROUTE_ID, route_id),
        association(CONSUMER_ID, consumer_id),
        ALL_INDEX,
    ],
};

static CERTIFICATES: TableSchema = TableSchema {
    kind: EntityKind::Certificate,
    indexes: &[unique(ID, id_of), ALL_INDEX],
};

pub fn table_schema(kind: EntityKind) -> &'static TableSchema {
    match kind {
        EntityKind::Service => &SERVICES,
        EntityKind::Route => &ROUTES,
        EntityKind::Upstream => &UPSTREAMS,
        EntityKind::Target => &TARGETS,
        EntityKind::Consumer => &CONSUMERS,
        EntityKind::Plugin => &PLUGINS,
        EntityKind::Certificate => &CERTIFICATES,
    }
}
