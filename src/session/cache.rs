use crate::entity::{EntityHandle, EntityKind, Params};
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// A tracked entity plus the persistent state it had when loaded. Entities
/// cached without a snapshot (inserts, explicit updates) always count as
/// changed.
pub struct CachedEntity {
    pub(crate) entity: EntityHandle,
    pub(crate) any: Rc<dyn Any>,
    pub(crate) original: Option<Params>,
}

impl CachedEntity {
    pub fn has_changed(&self) -> bool {
        match &self.original {
            None => true,
            Some(original) => *original != self.entity.borrow().persistent_state(),
        }
    }

    pub fn entity(&self) -> &EntityHandle {
        &self.entity
    }
}

/// Identity map keyed by `(kind, id)`. Iteration follows first-put order so
/// flushes are deterministic.
#[derive(Default)]
pub struct EntityCache {
    entries: Vec<CachedEntity>,
    index: HashMap<(EntityKind, String), usize>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&CachedEntity> {
        self.index
            .get(&(kind, id.to_string()))
            .map(|idx| &self.entries[*idx])
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.index.contains_key(&(kind, id.to_string()))
    }

    /// Stores `entity` under `(kind, id)`. An existing entry keeps its slot;
    /// passing `snapshot: None` drops any earlier snapshot so the entry is
    /// flushed unconditionally.
    pub(crate) fn put(
        &mut self,
        kind: EntityKind,
        id: String,
        entity: EntityHandle,
        any: Rc<dyn Any>,
        snapshot: Option<Params>,
    ) {
        let entry = CachedEntity {
            entity,
            any,
            original: snapshot,
        };
        match self.index.get(&(kind, id.clone())) {
            Some(idx) => self.entries[*idx] = entry,
            None => {
                self.index.insert((kind, id), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub(crate) fn remove(&mut self, kind: EntityKind, id: &str) -> Option<CachedEntity> {
        let idx = self.index.remove(&(kind, id.to_string()))?;
        let removed = self.entries.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub(crate) fn refresh_snapshots(&mut self) {
        for entry in &mut self.entries {
            let state = entry.entity.borrow().persistent_state();
            entry.original = Some(state);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedEntity> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
