//! Part records and part collections.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::host::{PartId, PartPrefab, VesselId};
use crate::ids::ModuleId;

/// One physical part and the ids of its module records, in template order
#[derive(Debug, Clone)]
pub struct PartRecord {
    part_id: PartId,
    prefab: Arc<PartPrefab>,
    modules: Vec<ModuleId>,
}

impl PartRecord {
    pub fn new(part_id: PartId, prefab: Arc<PartPrefab>) -> Self {
        Self {
            part_id,
            prefab,
            modules: Vec::new(),
        }
    }

    pub fn part_id(&self) -> PartId {
        self.part_id
    }

    pub fn prefab(&self) -> &Arc<PartPrefab> {
        &self.prefab
    }

    /// Internal part name
    pub fn name(&self) -> &str {
        &self.prefab.name
    }

    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    pub(crate) fn push_module(&mut self, id: ModuleId) {
        self.modules.push(id);
    }

    pub(crate) fn remove_module(&mut self, id: ModuleId) -> bool {
        let before = self.modules.len();
        self.modules.retain(|m| *m != id);
        self.modules.len() != before
    }

    pub(crate) fn modules_mut(&mut self) -> &mut [ModuleId] {
        &mut self.modules
    }
}

/// Which scope a collection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionScope {
    /// The ship under construction in the editor
    Ship,
    Vessel(VesselId),
}

/// Insertion-ordered set of parts, indexed by part id
#[derive(Debug, Clone)]
pub struct PartCollection {
    scope: CollectionScope,
    parts: IndexMap<PartId, PartRecord>,
}

impl PartCollection {
    pub fn new(scope: CollectionScope) -> Self {
        Self {
            scope,
            parts: IndexMap::new(),
        }
    }

    pub fn scope(&self) -> CollectionScope {
        self.scope
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn contains(&self, part_id: PartId) -> bool {
        self.parts.contains_key(&part_id)
    }

    pub fn get(&self, part_id: PartId) -> Option<&PartRecord> {
        self.parts.get(&part_id)
    }

    pub(crate) fn get_mut(&mut self, part_id: PartId) -> Option<&mut PartRecord> {
        self.parts.get_mut(&part_id)
    }

    /// Parts in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PartRecord> + Clone {
        self.parts.values()
    }

    pub fn part_ids(&self) -> Vec<PartId> {
        self.parts.keys().copied().collect()
    }

    /// Every module id, part by part
    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.parts.values().flat_map(|p| p.modules.iter().copied())
    }

    /// Insert a part. A part already present is left alone and `false` is
    /// returned.
    pub(crate) fn insert(&mut self, part: PartRecord) -> bool {
        if self.parts.contains_key(&part.part_id) {
            log::warn!(
                "part {} ({}) is already in collection {:?}",
                part.part_id,
                part.prefab.title,
                self.scope
            );
            return false;
        }
        self.parts.insert(part.part_id, part);
        true
    }

    /// The part record for `part_id`, inserting an empty one if missing
    pub(crate) fn get_or_insert(
        &mut self,
        part_id: PartId,
        prefab: &Arc<PartPrefab>,
    ) -> &mut PartRecord {
        self.parts
            .entry(part_id)
            .or_insert_with(|| PartRecord::new(part_id, prefab.clone()))
    }

    /// Remove a part, keeping the order of the others
    pub(crate) fn remove(&mut self, part_id: PartId) -> Option<PartRecord> {
        self.parts.shift_remove(&part_id)
    }

    /// Remove every part, returning them in order
    pub(crate) fn drain(&mut self) -> Vec<PartRecord> {
        self.parts.drain(..).map(|(_, part)| part).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PermanentId;

    fn prefab() -> Arc<PartPrefab> {
        PartPrefab::new("pod").into_shared()
    }

    fn id(raw: u32) -> ModuleId {
        ModuleId::Permanent(PermanentId::new(raw).unwrap())
    }

    #[test]
    fn test_insertion_order_survives_removal() {
        let mut parts = PartCollection::new(CollectionScope::Vessel(VesselId(1)));
        for raw in [3, 1, 2] {
            assert!(parts.insert(PartRecord::new(PartId(raw), prefab())));
        }
        parts.remove(PartId(1));
        assert_eq!(parts.part_ids(), vec![PartId(3), PartId(2)]);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut parts = PartCollection::new(CollectionScope::Ship);
        let mut first = PartRecord::new(PartId(1), prefab());
        first.push_module(id(10));
        assert!(parts.insert(first));
        assert!(!parts.insert(PartRecord::new(PartId(1), prefab())));
        assert_eq!(parts.get(PartId(1)).unwrap().modules(), &[id(10)]);
    }

    #[test]
    fn test_module_ids_in_part_order() {
        let mut parts = PartCollection::new(CollectionScope::Ship);
        parts.get_or_insert(PartId(1), &prefab()).push_module(id(5));
        parts.get_or_insert(PartId(2), &prefab()).push_module(id(6));
        parts.get_or_insert(PartId(1), &prefab()).push_module(id(7));
        let ids: Vec<_> = parts.module_ids().collect();
        assert_eq!(ids, vec![id(5), id(7), id(6)]);
    }

    #[test]
    fn test_drain_empties_collection() {
        let mut parts = PartCollection::new(CollectionScope::Ship);
        parts.insert(PartRecord::new(PartId(1), prefab()));
        parts.insert(PartRecord::new(PartId(2), prefab()));
        let drained = parts.drain();
        assert_eq!(drained.len(), 2);
        assert!(parts.is_empty());
    }
}
