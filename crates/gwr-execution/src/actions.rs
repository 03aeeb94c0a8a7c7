use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use gwr_reconcile::{ChangeEvent, ChangeOp};
use gwr_schemas::{
    Certificate, Consumer, Entity, EntityKind, EntityRecord, Plugin, Route, Service, Target,
    Upstream,
};
use tracing::warn;

use crate::admin::{AdminApi, AdminError};
use crate::error::SolveError;

/// Per-kind handler performing the remote call for one change event.
///
/// Each method returns the entity to write back: the server echo for
/// create/update, the old record for delete.
#[async_trait::async_trait]
pub trait Actions: Send + Sync {
    fn kind(&self) -> EntityKind;

    async fn create(&self, event: &ChangeEvent) -> Result<Entity, SolveError>;

    async fn update(&self, event: &ChangeEvent) -> Result<Entity, SolveError>;

    async fn delete(&self, event: &ChangeEvent) -> Result<Entity, SolveError>;
}

/// [`Actions`] for one concrete kind backed by an [`AdminApi`].
pub struct KindActions<T: EntityRecord> {
    admin: Arc<dyn AdminApi>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: EntityRecord> KindActions<T> {
    pub fn new(admin: Arc<dyn AdminApi>) -> Self {
        Self {
            admin,
            _kind: PhantomData,
        }
    }

    /// Checks the event shape and returns the side `op` acts on.
    fn subject<'e>(&self, event: &'e ChangeEvent, op: ChangeOp) -> Result<&'e Entity, SolveError> {
        let dispatch = |reason: String| SolveError::Dispatch {
            kind: T::KIND,
            op,
            reason,
        };
        if event.op != op {
            return Err(dispatch(format!("{} event routed to the {op} handler", event.op)));
        }
        let (side, entity) = match op {
            ChangeOp::Create | ChangeOp::Update => ("new", event.new.as_ref()),
            ChangeOp::Delete => ("old", event.old.as_ref()),
        };
        let entity = entity.ok_or_else(|| dispatch(format!("event has no `{side}` entity")))?;
        if T::from_entity(entity).is_none() {
            return Err(dispatch(format!("payload is a {}", entity.kind())));
        }
        Ok(entity)
    }

    fn remote(&self, entity: &Entity, op: ChangeOp, source: AdminError) -> SolveError {
        SolveError::Remote {
            kind: T::KIND,
            identity: entity.identity(),
            op,
            source,
        }
    }

    async fn put(&self, event: &ChangeEvent, op: ChangeOp) -> Result<Entity, SolveError> {
        let entity = self.subject(event, op)?;
        let echoed = self
            .admin
            .create(entity)
            .await
            .map_err(|e| self.remote(entity, op, e))?;
        if echoed.kind() != T::KIND {
            return Err(SolveError::Dispatch {
                kind: T::KIND,
                op,
                reason: format!("{} echoed a {}", self.admin.name(), echoed.kind()),
            });
        }
        Ok(echoed)
    }
}

#[async_trait::async_trait]
impl<T: EntityRecord> Actions for KindActions<T> {
    fn kind(&self) -> EntityKind {
        T::KIND
    }

    async fn create(&self, event: &ChangeEvent) -> Result<Entity, SolveError> {
        self.put(event, ChangeOp::Create).await
    }

    /// Create-or-replace on the entity's id.
    async fn update(&self, event: &ChangeEvent) -> Result<Entity, SolveError> {
        self.put(event, ChangeOp::Update).await
    }

    async fn delete(&self, event: &ChangeEvent) -> Result<Entity, SolveError> {
        let old = self.subject(event, ChangeOp::Delete)?;
        match self.admin.delete(old).await {
            Ok(()) => Ok(old.clone()),
            Err(e) if e.is_not_found() => {
                warn!(kind = %T::KIND, identity = %old.identity(), "delete target already absent");
                Ok(old.clone())
            }
            Err(e) => Err(self.remote(old, ChangeOp::Delete, e)),
        }
    }
}

/// Handler per kind. Built exhaustively so adding a kind without a handler
/// does not compile.
#[derive(Clone)]
pub struct ActionRegistry {
    handlers: BTreeMap<EntityKind, Arc<dyn Actions>>,
}

impl ActionRegistry {
    pub fn for_admin(admin: Arc<dyn AdminApi>) -> Self {
        let mut handlers: BTreeMap<EntityKind, Arc<dyn Actions>> = BTreeMap::new();
        for kind in EntityKind::ALL {
            let a = admin.clone();
            let handler: Arc<dyn Actions> = match kind {
                EntityKind::Service => Arc::new(KindActions::<Service>::new(a)),
                EntityKind::Route => Arc::new(KindActions::<Route>::new(a)),
                EntityKind::Upstream => Arc::new(KindActions::<Upstream>::new(a)),
                EntityKind::Target => Arc::new(KindActions::<Target>::new(a)),
                EntityKind::Consumer => Arc::new(KindActions::<Consumer>::new(a)),
                EntityKind::Plugin => Arc::new(KindActions::<Plugin>::new(a)),
                EntityKind::Certificate => Arc::new(KindActions::<Certificate>::new(a)),
            };
            handlers.insert(kind, handler);
        }
        Self { handlers }
    }

    /// Replaces the handler for `handler.kind()`.
    pub fn register(&mut self, handler: Arc<dyn Actions>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: EntityKind) -> Option<&Arc<dyn Actions>> {
        self.handlers.get(&kind)
    }
}
