use crate::entity::{EntityHandle, EntityKind};
use std::collections::HashMap;

/// Pending entities grouped by kind. Kinds and ids keep registration order;
/// registering the same `(kind, id)` twice keeps the first slot.
#[derive(Default)]
pub struct WriteSet {
    kinds: Vec<EntityKind>,
    by_kind: HashMap<EntityKind, Vec<(String, EntityHandle)>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: EntityKind, id: String, entity: EntityHandle) -> bool {
        let entries = self.by_kind.entry(kind).or_insert_with(|| {
            self.kinds.push(kind);
            Vec::new()
        });
        if entries.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        entries.push((id, entity));
        true
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.by_kind
            .get(&kind)
            .is_some_and(|entries| entries.iter().any(|(existing, _)| existing == id))
    }

    pub fn remove(&mut self, kind: EntityKind, id: &str) -> Option<EntityHandle> {
        let entries = self.by_kind.get_mut(&kind)?;
        let pos = entries.iter().position(|(existing, _)| existing == id)?;
        Some(entries.remove(pos).1)
    }

    pub fn kinds(&self) -> &[EntityKind] {
        &self.kinds
    }

    pub fn entries(&self, kind: EntityKind) -> &[(String, EntityHandle)] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids(&self) -> Vec<(EntityKind, String)> {
        self.kinds
            .iter()
            .flat_map(|kind| {
                self.entries(*kind)
                    .iter()
                    .map(move |(id, _)| (*kind, id.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.kinds.clear();
        self.by_kind.clear();
    }
}
