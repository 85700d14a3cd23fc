//! Owning storage for every module record.

use std::collections::HashMap;

use super::module::{ModuleData, ModuleRecord};
use crate::ids::{ModuleId, PermanentId};

/// Records keyed by id. The permanent-keyed entries form the global index.
#[derive(Debug, Default)]
pub struct ModuleArena {
    records: HashMap<ModuleId, ModuleRecord>,
}

impl ModuleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &ModuleId) -> Option<&mut ModuleRecord> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.records.contains_key(id)
    }

    pub fn contains_permanent(&self, id: PermanentId) -> bool {
        self.records.contains_key(&ModuleId::Permanent(id))
    }

    /// Insert under the record's own id. Returns the record back if the id
    /// is taken.
    pub(crate) fn insert(&mut self, record: ModuleRecord) -> Result<(), ModuleRecord> {
        let id = record.id();
        if self.records.contains_key(&id) {
            return Err(record);
        }
        self.records.insert(id, record);
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &ModuleId) -> Option<ModuleRecord> {
        self.records.remove(id)
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records in the global index
    pub fn permanent_count(&self) -> usize {
        self.records.keys().filter(|id| id.is_permanent()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.values()
    }

    /// Typed view over the records behind `ids`, skipping other kinds and
    /// ids that no longer resolve
    pub fn of_kind<'a, T: ModuleData>(
        &'a self,
        ids: impl Iterator<Item = ModuleId> + 'a,
    ) -> impl Iterator<Item = &'a T> + 'a {
        ids.filter_map(move |id| self.records.get(&id))
            .filter_map(|record| record.downcast_ref::<T>())
    }
}
