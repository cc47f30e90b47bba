pub mod cache;
mod flush;
pub mod write_set;

use self::flush::RevisionLog;

pub use cache::{CachedEntity, EntityCache};
pub use write_set::WriteSet;

use crate::entity::{
    Entity, EntityHandle, EntityKind, EntityRef, Params, PersistentEntity, Row,
};
use crate::error::StoreError;
use crate::idgen::IdGenerator;
use crate::mapping::{MappingRegistry, StatementOperation};
use crate::store::{Connection, ConnectionFactory};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub bulk_insert_enabled: bool,
    pub max_statements_in_bulk_insert: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            bulk_insert_enabled: true,
            max_statements_in_bulk_insert: 100,
        }
    }
}

/// Statement-based delete scheduled for the flush slot of `kind`.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDelete {
    pub statement: String,
    pub params: Params,
}

/// Unit of work over one store connection. Entities read or written through a
/// session are tracked in its cache; `flush` turns the pending work into
/// statements in foreign-key-safe order.
///
/// A session is confined to the thread that opened it.
pub struct Session {
    conn: Box<dyn Connection>,
    mappings: Arc<MappingRegistry>,
    ids: Option<Arc<dyn IdGenerator>>,
    settings: SessionSettings,
    cache: EntityCache,
    inserted: WriteSet,
    deleted: WriteSet,
    bulk_delete_kinds: Vec<EntityKind>,
    bulk_deletes: HashMap<EntityKind, Vec<BulkDelete>>,
}

impl Session {
    pub fn new(
        conn: Box<dyn Connection>,
        mappings: Arc<MappingRegistry>,
        ids: Option<Arc<dyn IdGenerator>>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            conn,
            mappings,
            ids,
            settings,
            cache: EntityCache::new(),
            inserted: WriteSet::new(),
            deleted: WriteSet::new(),
            bulk_delete_kinds: Vec::new(),
            bulk_deletes: HashMap::new(),
        }
    }

    pub fn mappings(&self) -> &MappingRegistry {
        &self.mappings
    }

    pub fn connection(&mut self) -> &mut dyn Connection {
        self.conn.as_mut()
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Schedules `entity` for insertion, assigning an id first when it has
    /// none. The returned handle is the instance every later read in this
    /// session resolves to.
    pub fn insert<T: Entity>(&mut self, mut entity: T) -> Result<EntityRef<T>, StoreError> {
        let id = match entity.id().map(str::to_string) {
            Some(id) => id,
            None => {
                let ids = self.ids.as_ref().ok_or_else(|| StoreError::InvalidConfig {
                    message: format!(
                        "cannot insert {} without an id: session has no id generator",
                        entity.kind()
                    ),
                })?;
                let id = ids.next_id()?;
                entity.set_id(id.clone());
                id
            }
        };
        let kind = entity.kind();
        entity.lifecycle_mut().inserted = true;

        let shared = Rc::new(RefCell::new(entity));
        let handle: EntityHandle = shared.clone();
        let any: Rc<dyn Any> = shared.clone();
        self.inserted.add(kind, id.clone(), Rc::clone(&handle));
        self.cache.put(kind, id, handle, any, None);
        Ok(shared)
    }

    /// Marks `entity` as updated. It is flushed even if its state matches
    /// what was loaded.
    pub fn update<T: Entity>(&mut self, entity: &EntityRef<T>) -> Result<(), StoreError> {
        let (kind, id) = Self::identity(&*entity.borrow())?;
        entity.borrow_mut().lifecycle_mut().updated = true;
        let handle: EntityHandle = entity.clone();
        let any: Rc<dyn Any> = entity.clone();
        self.cache.put(kind, id, handle, any, None);
        Ok(())
    }

    pub fn delete<T: Entity>(&mut self, entity: &EntityRef<T>) -> Result<(), StoreError> {
        let (kind, id) = Self::identity(&*entity.borrow())?;
        entity.borrow_mut().lifecycle_mut().deleted = true;
        let handle: EntityHandle = entity.clone();
        self.deleted.add(kind, id, handle);
        Ok(())
    }

    /// Schedules a statement-based delete that runs when `kind` comes up in
    /// delete order.
    pub fn delete_bulk(&mut self, statement: &str, params: Params, kind: EntityKind) {
        if !self.bulk_deletes.contains_key(&kind) {
            self.bulk_delete_kinds.push(kind);
        }
        self.bulk_deletes.entry(kind).or_default().push(BulkDelete {
            statement: statement.to_string(),
            params,
        });
    }

    /// Runs a statement-based update right away and returns the affected row
    /// count. Cached entities are not refreshed.
    pub fn update_bulk(&mut self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        let mappings = Arc::clone(&self.mappings);
        self.conn.update(mappings.map_statement(statement), params)
    }

    pub fn select_by_id<T: PersistentEntity>(
        &mut self,
        id: &str,
    ) -> Result<Option<EntityRef<T>>, StoreError> {
        if let Some(cached) = self.cached::<T>(id)? {
            return Ok(Some(cached));
        }
        let mappings = Arc::clone(&self.mappings);
        let statement = mappings.entity_statement(T::KIND, StatementOperation::SelectById)?;
        let rows = self.conn.select(statement, &Params::new().with("id", id))?;
        match rows.first() {
            Some(row) => Ok(Some(self.track_loaded(T::from_row(row)?)?)),
            None => Ok(None),
        }
    }

    pub fn select_list<T: PersistentEntity>(
        &mut self,
        statement: &str,
        params: &Params,
    ) -> Result<Vec<EntityRef<T>>, StoreError> {
        let rows = self.select_rows(statement, params)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.track_loaded(T::from_row(row)?)?);
        }
        Ok(out)
    }

    pub fn select_one<T: PersistentEntity>(
        &mut self,
        statement: &str,
        params: &Params,
    ) -> Result<Option<EntityRef<T>>, StoreError> {
        let mut found = self.select_list::<T>(statement, params)?;
        if found.len() > 1 {
            return Err(StoreError::Validation(format!(
                "statement '{statement}' returned {} rows, expected at most one",
                found.len()
            )));
        }
        Ok(found.pop())
    }

    /// Raw rows; nothing is cached.
    pub fn select_rows(&mut self, statement: &str, params: &Params) -> Result<Vec<Row>, StoreError> {
        let mappings = Arc::clone(&self.mappings);
        self.conn.select(mappings.map_statement(statement), params)
    }

    pub fn cached<T: PersistentEntity>(&self, id: &str) -> Result<Option<EntityRef<T>>, StoreError> {
        match self.cache.get(T::KIND, id) {
            Some(entry) => Self::downcast::<T>(entry, id).map(Some),
            None => Ok(None),
        }
    }

    /// Flushes inside one store transaction. Any failure rolls the
    /// transaction back, restores the revisions the flush advanced and leaves
    /// the session's pending work in place.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        self.conn.begin()?;
        let mut revisions = RevisionLog::default();
        let written = self
            .write_pending(&mut revisions)
            .and_then(|()| self.conn.commit());
        if let Err(err) = written {
            if let Err(rollback_err) = self.conn.rollback() {
                warn!(error = %rollback_err, "rollback after failed commit also failed");
            }
            revisions.restore();
            return Err(err);
        }
        self.after_flush();
        Ok(())
    }

    /// Discards pending inserts and deletes without touching the store.
    pub fn discard(&mut self) {
        for (kind, id) in self.inserted.ids() {
            self.cache.remove(kind, &id);
        }
        self.inserted.clear();
        self.deleted.clear();
        self.bulk_delete_kinds.clear();
        self.bulk_deletes.clear();
    }

    fn identity(entity: &dyn Entity) -> Result<(EntityKind, String), StoreError> {
        let id = entity.id().ok_or_else(|| {
            StoreError::Validation(format!("{} has no id assigned", entity.kind()))
        })?;
        Ok((entity.kind(), id.to_string()))
    }

    fn downcast<T: PersistentEntity>(
        entry: &CachedEntity,
        id: &str,
    ) -> Result<EntityRef<T>, StoreError> {
        Rc::clone(&entry.any)
            .downcast::<RefCell<T>>()
            .map_err(|_| StoreError::TypeMismatch {
                kind: T::KIND,
                id: id.to_string(),
            })
    }

    /// Caches a freshly loaded entity with a snapshot, unless the same
    /// `(kind, id)` is already tracked, in which case the tracked instance
    /// wins.
    fn track_loaded<T: PersistentEntity>(&mut self, entity: T) -> Result<EntityRef<T>, StoreError> {
        let (kind, id) = Self::identity(&entity)?;
        if let Some(entry) = self.cache.get(kind, &id) {
            return Self::downcast::<T>(entry, &id);
        }
        let snapshot = entity.persistent_state();
        let shared = Rc::new(RefCell::new(entity));
        let handle: EntityHandle = shared.clone();
        let any: Rc<dyn Any> = shared.clone();
        self.cache.put(kind, id, handle, any, Some(snapshot));
        Ok(shared)
    }
}

/// Opens sessions against one connection factory and mapping registry.
pub struct SessionFactory {
    connections: Arc<dyn ConnectionFactory>,
    mappings: Arc<MappingRegistry>,
    settings: SessionSettings,
}

impl SessionFactory {
    pub fn new(
        connections: Arc<dyn ConnectionFactory>,
        mappings: Arc<MappingRegistry>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            connections,
            mappings,
            settings,
        }
    }

    pub fn open_session(&self, ids: Option<Arc<dyn IdGenerator>>) -> Result<Session, StoreError> {
        let conn = self.connections.open()?;
        Ok(Session::new(
            conn,
            Arc::clone(&self.mappings),
            ids,
            self.settings,
        ))
    }

    pub fn mappings(&self) -> &Arc<MappingRegistry> {
        &self.mappings
    }

    pub fn dialect(&self) -> &str {
        self.connections.dialect()
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }
}
