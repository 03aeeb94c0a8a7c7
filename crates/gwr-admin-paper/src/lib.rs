//! Deterministic in-memory "paper" gateway admin API.
//!
//! Behaves like the real admin API where reconciliation can observe it:
//! - Creates are create-or-replace on the id; a missing id becomes a UUIDv5
//!   over `kind:identity`, so the same input always gets the same id.
//! - Associations must point at existing records (resolved by id, else by
//!   name) and are echoed with ids. Unique names are enforced per kind.
//! - Deleting a record that something still references is rejected.
//! - Timestamps come from a logical clock starting at 1_700_000_000 and
//!   advancing by one per write. No wall clock, no randomness.
//!
//! Failures can be injected per `(kind, identity)` for partial-application
//! scenarios.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use gwr_execution::{AdminApi, AdminError};
use gwr_schemas::{Entity, EntityKind};
use tracing::debug;
use uuid::Uuid;

const CLOCK_START: i64 = 1_700_000_000;

/// Namespace for ids the paper admin assigns itself.
const PAPER_NAMESPACE: Uuid = Uuid::from_u128(0x6777_725f_7061_7065_725f_6164_6d69_6e00);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaperOp {
    Create,
    Delete,
    List,
}

/// One call as the paper admin saw it, for asserting on call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaperCall {
    pub op: PaperOp,
    pub kind: EntityKind,
    pub identity: String,
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<(EntityKind, String), Entity>,
    clock: i64,
    failures: BTreeMap<(EntityKind, String), String>,
    calls: Vec<PaperCall>,
}

#[derive(Default)]
pub struct PaperAdmin {
    inner: Mutex<Inner>,
}

impl PaperAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads records directly, bypassing failure injection and call logging.
    pub fn seed(&self, entities: impl IntoIterator<Item = Entity>) -> Result<(), AdminError> {
        let mut inner = self.lock();
        for e in entities {
            inner.put(&e)?;
        }
        Ok(())
    }

    /// Makes every later create or delete of `(kind, identity)` fail with
    /// an HTTP 500 carrying `message`.
    pub fn inject_failure(&self, kind: EntityKind, identity: impl Into<String>, message: impl Into<String>) {
        self.lock()
            .failures
            .insert((kind, identity.into()), message.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<PaperCall> {
        self.lock().calls.clone()
    }

    /// All records, ordered by kind then id.
    pub fn entities(&self) -> Vec<Entity> {
        self.lock().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        CLOCK_START + self.clock
    }

    fn check_failure(&mut self, op: PaperOp, entity: &Entity) -> Result<(), AdminError> {
        let identity = entity.identity();
        self.calls.push(PaperCall {
            op,
            kind: entity.kind(),
            identity: identity.clone(),
        });
        match self.failures.get(&(entity.kind(), identity)) {
            Some(message) => Err(AdminError::Http {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn find(&self, kind: EntityKind, key: &str, by_id: bool) -> Option<&Entity> {
        if by_id {
            return self.records.get(&(kind, key.to_string()));
        }
        self.records
            .range((kind, String::new())..)
            .take_while(|((k, _), _)| *k == kind)
            .map(|(_, e)| e)
            .find(|e| e.name() == Some(key))
    }

    fn put(&mut self, entity: &Entity) -> Result<Entity, AdminError> {
        let mut echo = entity.clone();
        let kind = echo.kind();
        let id = match echo.id() {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v5(&PAPER_NAMESPACE, format!("{kind}:{}", echo.identity()).as_bytes())
                    .to_string();
                echo.set_id(id.clone());
                id
            }
        };

        // Foreign keys: every set association must resolve.
        let mut resolved = Vec::new();
        for assoc in echo.associations() {
            let Some(r) = assoc.reference else { continue };
            let target = match (&r.id, &r.name) {
                (Some(ref_id), _) => self.find(assoc.target, ref_id, true),
                (None, Some(name)) => self.find(assoc.target, name, false),
                (None, None) => None,
            };
            match target.and_then(Entity::id) {
                Some(target_id) => resolved.push(target_id.to_string()),
                None => {
                    return Err(AdminError::Http {
                        status: 400,
                        message: format!(
                            "foreign key violation: {kind}.{} references a missing {}",
                            assoc.field, assoc.target
                        ),
                    })
                }
            }
        }
        let mut ids = resolved.into_iter();
        for (_, slot) in echo.associations_mut() {
            if let Some(r) = slot.as_mut() {
                r.id = ids.next();
            }
        }

        if let Some(name) = echo.name() {
            let taken = self
                .find(kind, name, false)
                .and_then(Entity::id)
                .is_some_and(|owner| owner != id);
            if taken {
                return Err(AdminError::Http {
                    status: 409,
                    message: format!("unique constraint violation: {kind} name `{name}`"),
                });
            }
        }

        let now = self.tick();
        let created_at = self
            .records
            .get(&(kind, id.clone()))
            .and_then(Entity::created_at)
            .unwrap_or(now);
        echo.set_timestamps(Some(created_at), Some(now));
        self.records.insert((kind, id), echo.clone());
        Ok(echo)
    }

    fn remove(&mut self, entity: &Entity) -> Result<(), AdminError> {
        let kind = entity.kind();
        let Some(id) = entity.id().map(str::to_string) else {
            return Err(AdminError::NotFound {
                kind,
                key: entity.identity(),
            });
        };
        if !self.records.contains_key(&(kind, id.clone())) {
            return Err(AdminError::NotFound { kind, key: id });
        }
        let referenced = self.records.values().any(|other| {
            other.associations().iter().any(|a| {
                a.target == kind && a.reference.and_then(|r| r.id.as_deref()) == Some(id.as_str())
            })
        });
        if referenced {
            return Err(AdminError::Http {
                status: 400,
                message: format!("{kind} `{id}` is still referenced"),
            });
        }
        self.records.remove(&(kind, id));
        self.tick();
        Ok(())
    }
}

#[async_trait::async_trait]
impl AdminApi for PaperAdmin {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn create(&self, entity: &Entity) -> Result<Entity, AdminError> {
        let mut inner = self.lock();
        inner.check_failure(PaperOp::Create, entity)?;
        let echo = inner.put(entity)?;
        debug!(entity = %echo, "paper create");
        Ok(echo)
    }

    async fn delete(&self, entity: &Entity) -> Result<(), AdminError> {
        let mut inner = self.lock();
        inner.check_failure(PaperOp::Delete, entity)?;
        inner.remove(entity)?;
        debug!(entity = %entity, "paper delete");
        Ok(())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, AdminError> {
        let mut inner = self.lock();
        inner.calls.push(PaperCall {
            op: PaperOp::List,
            kind,
            identity: String::new(),
        });
        Ok(inner
            .records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, e)| e.clone())
            .collect())
    }
}
