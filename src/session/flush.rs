use super::Session;
use crate::entity::{EntityHandle, EntityKind, describe, statement_params};
use crate::error::StoreError;
use crate::mapping::StatementOperation;
use crate::order::{self, hierarchical_order};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

/// Revisions as they were before the flush advanced them, restored when the
/// surrounding transaction rolls back.
#[derive(Default)]
pub(super) struct RevisionLog {
    previous: Vec<(EntityHandle, i32)>,
}

impl RevisionLog {
    fn advance(&mut self, handle: &EntityHandle, next: i32) {
        let mut entity = handle.borrow_mut();
        if let Some(previous) = entity.revision() {
            self.previous.push((Rc::clone(handle), previous));
            entity.set_revision(next);
        }
    }

    pub(super) fn restore(self) {
        for (handle, previous) in self.previous.into_iter().rev() {
            handle.borrow_mut().set_revision(previous);
        }
    }
}

impl Session {
    /// Writes all pending work to the connection: inserts, then updates, then
    /// deletes. Runs inside whatever transaction the connection has open;
    /// use [`Session::commit`] for an atomic flush.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.write_pending(&mut RevisionLog::default())?;
        self.after_flush();
        Ok(())
    }

    pub(super) fn write_pending(&mut self, revisions: &mut RevisionLog) -> Result<(), StoreError> {
        let updated = self.determine_updated_objects();
        self.remove_unnecessary_operations();
        debug!(
            inserts = self.inserted.len(),
            updates = updated.len(),
            deletes = self.deleted.len(),
            bulk_deletes = self.bulk_deletes.values().map(Vec::len).sum::<usize>(),
            "flushing session"
        );

        self.flush_inserts(revisions)?;
        self.flush_updates(&updated, revisions)?;
        self.flush_deletes()
    }

    /// Cached entities that changed since load and are neither being inserted
    /// nor deleted. Hierarchical entities pending delete are still updated so
    /// their pointers are cleared before the delete runs.
    fn determine_updated_objects(&self) -> Vec<EntityHandle> {
        let mut updated = Vec::new();
        for entry in self.cache.iter() {
            let (kind, id) = {
                let entity = entry.entity.borrow();
                match entity.id() {
                    Some(id) => (entity.kind(), id.to_string()),
                    None => continue,
                }
            };
            if self.inserted.contains(kind, &id) {
                continue;
            }
            if self.deleted.contains(kind, &id) && !kind.is_hierarchical() {
                continue;
            }
            if entry.has_changed() {
                updated.push(Rc::clone(&entry.entity));
            }
        }
        updated
    }

    /// Drops insert+delete pairs of the same entity. Neither statement is
    /// issued.
    fn remove_unnecessary_operations(&mut self) {
        for (kind, id) in self.deleted.ids() {
            if self.inserted.remove(kind, &id).is_some() {
                self.deleted.remove(kind, &id);
                self.cache.remove(kind, &id);
                trace!(kind = %kind, id = %id, "insert and delete cancelled");
            }
        }
    }

    fn flush_inserts(&mut self, revisions: &mut RevisionLog) -> Result<(), StoreError> {
        let mut kinds: Vec<EntityKind> = order::insert_order()
            .filter(|kind| !self.inserted.entries(*kind).is_empty())
            .collect();
        for kind in self.inserted.kinds() {
            if order::insert_position(*kind).is_none() && !self.inserted.entries(*kind).is_empty()
            {
                kinds.push(*kind);
            }
        }

        for kind in kinds {
            let mut handles: Vec<EntityHandle> = self
                .inserted
                .entries(kind)
                .iter()
                .map(|(_, handle)| Rc::clone(handle))
                .collect();
            if kind.is_hierarchical() {
                handles = order_hierarchy(handles, true);
            }
            self.flush_inserts_of(kind, &handles, revisions)?;
        }
        Ok(())
    }

    fn flush_inserts_of(
        &mut self,
        kind: EntityKind,
        handles: &[EntityHandle],
        revisions: &mut RevisionLog,
    ) -> Result<(), StoreError> {
        let mappings = Arc::clone(&self.mappings);
        let bulk = handles.len() > 1
            && self.settings.bulk_insert_enabled
            && mappings.is_bulk_insertable(kind);

        if bulk {
            let statement = mappings.entity_statement(kind, StatementOperation::BulkInsert)?;
            let chunk_size = self.settings.max_statements_in_bulk_insert.max(1);
            for chunk in handles.chunks(chunk_size) {
                let rows: Vec<_> = chunk
                    .iter()
                    .map(|handle| statement_params(&*handle.borrow()))
                    .collect();
                self.conn.insert_batch(statement, &rows)?;
            }
        } else {
            let statement = mappings.entity_statement(kind, StatementOperation::Insert)?;
            for handle in handles {
                let params = statement_params(&*handle.borrow());
                self.conn.insert(statement, &params)?;
            }
        }

        for handle in handles {
            let fresh = handle.borrow().revision() == Some(0);
            if fresh {
                revisions.advance(handle, 1);
            }
        }
        Ok(())
    }

    fn flush_updates(
        &mut self,
        updated: &[EntityHandle],
        revisions: &mut RevisionLog,
    ) -> Result<(), StoreError> {
        let mappings = Arc::clone(&self.mappings);
        for handle in updated {
            let (kind, id, params) = {
                let entity = handle.borrow();
                (
                    entity.kind(),
                    entity.id().unwrap_or_default().to_string(),
                    statement_params(&*entity),
                )
            };
            let statement = mappings.entity_statement(kind, StatementOperation::Update)?;
            let rows = self.conn.update(statement, &params)?;
            if rows == 0 {
                return Err(StoreError::OptimisticLock { kind, id });
            }
            let next = handle.borrow().revision_next();
            if let Some(next) = next {
                revisions.advance(handle, next);
            }
            trace!(entity = %describe(&*handle.borrow()), "updated");
        }
        Ok(())
    }

    fn flush_deletes(&mut self) -> Result<(), StoreError> {
        let mut kinds: Vec<EntityKind> = order::delete_order()
            .iter()
            .copied()
            .filter(|kind| self.has_deletes(*kind))
            .collect();
        let uncovered = self
            .deleted
            .kinds()
            .iter()
            .chain(self.bulk_delete_kinds.iter())
            .copied()
            .filter(|kind| order::delete_position(*kind).is_none())
            .collect::<Vec<_>>();
        for kind in uncovered {
            if self.has_deletes(kind) && !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        let mappings = Arc::clone(&self.mappings);
        for kind in kinds {
            let mut handles: Vec<EntityHandle> = self
                .deleted
                .entries(kind)
                .iter()
                .map(|(_, handle)| Rc::clone(handle))
                .collect();
            if kind.is_hierarchical() {
                handles = order_hierarchy(handles, false);
            }
            for handle in &handles {
                let (id, revisioned, params) = {
                    let entity = handle.borrow();
                    (
                        entity.id().unwrap_or_default().to_string(),
                        entity.revision().is_some(),
                        statement_params(&*entity),
                    )
                };
                let statement = mappings.entity_statement(kind, StatementOperation::Delete)?;
                let rows = self.conn.delete(statement, &params)?;
                // Non-revisioned rows may already be gone; only a revision
                // mismatch is a conflict.
                if rows == 0 && revisioned {
                    return Err(StoreError::OptimisticLock { kind, id });
                }
            }

            let bulk = self.bulk_deletes.get(&kind).cloned().unwrap_or_default();
            for delete in bulk {
                let removed = self
                    .conn
                    .delete(mappings.map_statement(&delete.statement), &delete.params)?;
                trace!(kind = %kind, statement = %delete.statement, removed, "bulk delete");
            }
        }
        Ok(())
    }

    fn has_deletes(&self, kind: EntityKind) -> bool {
        !self.deleted.entries(kind).is_empty()
            || self.bulk_deletes.get(&kind).is_some_and(|list| !list.is_empty())
    }

    pub(super) fn after_flush(&mut self) {
        for (kind, id) in self.deleted.ids() {
            self.cache.remove(kind, &id);
        }
        for entry in self.cache.iter() {
            *entry.entity.borrow_mut().lifecycle_mut() = Default::default();
        }
        self.inserted.clear();
        self.deleted.clear();
        self.bulk_delete_kinds.clear();
        self.bulk_deletes.clear();
        self.cache.refresh_snapshots();
    }
}

fn order_hierarchy(handles: Vec<EntityHandle>, parent_first: bool) -> Vec<EntityHandle> {
    let keys: Vec<(String, Option<String>)> = handles
        .iter()
        .map(|handle| {
            let entity = handle.borrow();
            let parent = entity
                .hierarchy()
                .and_then(|links| links.parent_key().map(str::to_string));
            (entity.id().unwrap_or_default().to_string(), parent)
        })
        .collect();
    let nodes: Vec<(&str, Option<&str>)> = keys
        .iter()
        .map(|(id, parent)| (id.as_str(), parent.as_deref()))
        .collect();
    hierarchical_order(&nodes, parent_first)
        .into_iter()
        .map(|idx| Rc::clone(&handles[idx]))
        .collect()
}
