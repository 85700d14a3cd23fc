//! The module database: owner of every record and coordinator of every
//! lifecycle protocol.
//!
//! All protocols are synchronous and run to completion inside the host
//! callback that triggered them. Protocols that walk a collection collect
//! the ids they need first and mutate afterwards.

mod lifecycle;
mod ship;
mod transfer;

pub use lifecycle::{LoadReport, RecoveryOutcome};

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::{ConsistencyError, IdError};
use crate::host::{PartId, PartPrefab, VesselId};
use crate::ids::{IdAllocator, IdSource, ModuleId, PermanentId};
use crate::records::{
    CollectionScope, ModuleArena, ModuleData, ModuleRecord, PartCollection, PartRecord,
    RecordState, VesselAggregate,
};
use crate::registry::{ModuleKind, TypeRegistry};

/// The ship being built in the editor
#[derive(Debug)]
pub struct ShipSession {
    name: String,
    parts: PartCollection,
}

impl ShipSession {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parts: PartCollection::new(CollectionScope::Ship),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parts(&self) -> &PartCollection {
        &self.parts
    }
}

/// A flight vessel, loaded or not
#[derive(Debug)]
pub struct VesselData {
    id: VesselId,
    name: String,
    loaded: bool,
    parts: PartCollection,
    aggregate: Option<VesselAggregate>,
}

impl VesselData {
    fn new(id: VesselId, name: &str, loaded: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            loaded,
            parts: PartCollection::new(CollectionScope::Vessel(id)),
            aggregate: None,
        }
    }

    pub fn id(&self) -> VesselId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn parts(&self) -> &PartCollection {
        &self.parts
    }
}

/// Owns every module record, the ship session and the flight vessels
pub struct Database {
    config: DatabaseConfig,
    registry: Arc<TypeRegistry>,
    ids: IdAllocator,
    arena: ModuleArena,
    ship: Option<ShipSession>,
    vessels: IndexMap<VesselId, VesselData>,
    part_vessels: HashMap<PartId, VesselId>,
    /// Unknown component kinds already reported
    warned_kinds: HashSet<String>,
}

impl Database {
    pub fn new(registry: Arc<TypeRegistry>, config: DatabaseConfig) -> Self {
        let ids = IdAllocator::from_config(&config);
        Self::with_allocator(registry, config, ids)
    }

    /// Database drawing id candidates from `source`
    pub fn with_id_source(
        registry: Arc<TypeRegistry>,
        config: DatabaseConfig,
        source: Box<dyn IdSource>,
    ) -> Self {
        let ids = IdAllocator::new(source, config.max_id_attempts);
        Self::with_allocator(registry, config, ids)
    }

    fn with_allocator(registry: Arc<TypeRegistry>, config: DatabaseConfig, ids: IdAllocator) -> Self {
        log::debug!("module database created with {} kinds", registry.len());
        Self {
            config,
            registry,
            ids,
            arena: ModuleArena::new(),
            ship: None,
            vessels: IndexMap::new(),
            part_vessels: HashMap::new(),
            warned_kinds: HashSet::new(),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn arena(&self) -> &ModuleArena {
        &self.arena
    }

    pub fn ship(&self) -> Option<&ShipSession> {
        self.ship.as_ref()
    }

    pub fn vessel(&self, id: VesselId) -> Option<&VesselData> {
        self.vessels.get(&id)
    }

    /// Flight vessels in creation order
    pub fn vessels(&self) -> impl Iterator<Item = &VesselData> {
        self.vessels.values()
    }

    /// Vessel currently holding a part
    pub fn vessel_of(&self, part: PartId) -> Option<VesselId> {
        self.part_vessels.get(&part).copied()
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    /// Global lookup by permanent id
    pub fn resolve(&self, id: PermanentId) -> Option<&ModuleRecord> {
        self.arena.get(&ModuleId::Permanent(id))
    }

    pub fn resolve_mut(&mut self, id: PermanentId) -> Option<&mut ModuleRecord> {
        self.arena.get_mut(&ModuleId::Permanent(id))
    }

    /// Global lookup, typed
    pub fn resolve_as<T: ModuleData>(&self, id: PermanentId) -> Option<&T> {
        self.resolve(id)?.downcast_ref()
    }

    pub fn resolve_as_mut<T: ModuleData>(&mut self, id: PermanentId) -> Option<&mut T> {
        self.resolve_mut(id)?.downcast_mut()
    }

    /// Lookup by either kind of id
    pub fn record(&self, id: ModuleId) -> Option<&ModuleRecord> {
        self.arena.get(&id)
    }

    pub fn record_mut(&mut self, id: ModuleId) -> Option<&mut ModuleRecord> {
        self.arena.get_mut(&id)
    }

    pub fn collection(&self, scope: CollectionScope) -> Option<&PartCollection> {
        match scope {
            CollectionScope::Ship => self.ship.as_ref().map(|s| &s.parts),
            CollectionScope::Vessel(id) => self.vessels.get(&id).map(|v| &v.parts),
        }
    }

    fn collection_mut(&mut self, scope: CollectionScope) -> Option<&mut PartCollection> {
        match scope {
            CollectionScope::Ship => self.ship.as_mut().map(|s| &mut s.parts),
            CollectionScope::Vessel(id) => self.vessels.get_mut(&id).map(|v| &mut v.parts),
        }
    }

    /// Collection currently holding a part
    pub fn scope_of(&self, part: PartId) -> Option<CollectionScope> {
        if let Some(vessel) = self.part_vessels.get(&part) {
            return Some(CollectionScope::Vessel(*vessel));
        }
        self.ship
            .as_ref()
            .filter(|s| s.parts.contains(part))
            .map(|_| CollectionScope::Ship)
    }

    pub fn part_record(&self, part: PartId) -> Option<&PartRecord> {
        self.collection(self.scope_of(part)?)?.get(part)
    }

    /// Every record in a collection, part by part
    pub fn records_in_scope(&self, scope: CollectionScope) -> impl Iterator<Item = &ModuleRecord> {
        self.collection(scope)
            .into_iter()
            .flat_map(|parts| parts.module_ids())
            .filter_map(move |id| self.arena.get(&id))
    }

    /// Every record of kind `T` in a collection, enabled or not
    pub fn records_of_kind<T: ModuleData>(&self, scope: CollectionScope) -> impl Iterator<Item = &T> {
        self.records_in_scope(scope)
            .filter_map(|record| record.downcast_ref::<T>())
    }

    /// Enabled records of kind `T` in a collection, with their ids
    pub fn enabled_records_of_kind<T: ModuleData>(
        &self,
        scope: CollectionScope,
    ) -> impl Iterator<Item = (ModuleId, &T)> {
        self.records_in_scope(scope)
            .filter(|record| record.is_enabled())
            .filter_map(|record| Some((record.id(), record.downcast_ref::<T>()?)))
    }

    /// Records of kind `T` on one part, in template order
    pub fn records_in_part<T: ModuleData>(&self, part: PartId) -> impl Iterator<Item = &T> {
        let ids = self.part_record(part).map(PartRecord::modules).unwrap_or(&[]);
        self.arena.of_kind::<T>(ids.iter().copied())
    }

    /// First record of kind `T` on a part
    pub fn try_get_record_of_kind<T: ModuleData>(&self, part: PartId) -> Option<&T> {
        self.records_in_part::<T>(part).next()
    }

    pub fn try_get_record_of_kind_mut<T: ModuleData>(&mut self, part: PartId) -> Option<&mut T> {
        let id = self
            .part_record(part)?
            .modules()
            .iter()
            .copied()
            .find(|id| self.arena.get(id).is_some_and(|r| r.is::<T>()))?;
        self.arena.get_mut(&id)?.downcast_mut()
    }

    // ── Simulation ──────────────────────────────────────────────────────

    /// Run `on_update` on every started record: ship first, then vessels in
    /// creation order. Cached vessel aggregates are dropped.
    pub fn tick(&mut self, elapsed_seconds: f64) -> usize {
        let include_disabled = self.config.update_disabled;
        let ids: Vec<ModuleId> = self
            .ship
            .iter()
            .flat_map(|s| s.parts.module_ids())
            .chain(self.vessels.values().flat_map(|v| v.parts.module_ids()))
            .collect();

        let mut updated = 0;
        for id in ids {
            let Some(record) = self.arena.get_mut(&id) else {
                continue;
            };
            if record.state() != RecordState::Started {
                continue;
            }
            if !record.is_enabled() && !include_disabled {
                continue;
            }
            record.update(elapsed_seconds);
            updated += 1;
        }

        for vessel in self.vessels.values_mut() {
            vessel.aggregate = None;
        }
        updated
    }

    /// Derived state of a vessel, recomputed if it was invalidated
    pub fn vessel_aggregate(&mut self, id: VesselId) -> Option<&VesselAggregate> {
        let vessel = self.vessels.get_mut(&id)?;
        if vessel.aggregate.is_none() {
            let mut aggregate = VesselAggregate::new();
            aggregate.part_count = vessel.parts.len();
            for module in vessel.parts.module_ids() {
                let Some(record) = self.arena.get(&module) else {
                    continue;
                };
                aggregate.module_count += 1;
                if record.is_enabled() {
                    aggregate.enabled_count += 1;
                    record.data().on_vessel_update(&mut aggregate);
                }
            }
            log::trace!("recomputed aggregate of vessel {}", id);
            vessel.aggregate = Some(aggregate);
        }
        vessel.aggregate.as_ref()
    }

    /// Drop the cached aggregate of a vessel
    pub fn invalidate(&mut self, id: VesselId) {
        if let Some(vessel) = self.vessels.get_mut(&id) {
            vessel.aggregate = None;
        }
    }

    /// Verify that collections and the global index agree
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        let mut seen: HashSet<ModuleId> = HashSet::new();
        let scopes = self
            .ship
            .iter()
            .map(|s| &s.parts)
            .chain(self.vessels.values().map(|v| &v.parts));

        for parts in scopes {
            let expect_permanent = parts.scope() != CollectionScope::Ship;
            for part in parts.iter() {
                if let CollectionScope::Vessel(vessel) = parts.scope() {
                    if self.part_vessels.get(&part.part_id()) != Some(&vessel) {
                        return Err(ConsistencyError(format!(
                            "part {} is on vessel {} but not indexed there",
                            part.part_id(),
                            vessel
                        )));
                    }
                }
                for id in part.modules() {
                    if !seen.insert(*id) {
                        return Err(ConsistencyError(format!("{} is held twice", id)));
                    }
                    if id.is_permanent() != expect_permanent {
                        return Err(ConsistencyError(format!(
                            "{} has the wrong id kind for {:?}",
                            id,
                            parts.scope()
                        )));
                    }
                    let Some(record) = self.arena.get(id) else {
                        return Err(ConsistencyError(format!("{} has no record", id)));
                    };
                    if record.id() != *id || record.part() != part.part_id() {
                        return Err(ConsistencyError(format!(
                            "{} is filed under part {} but belongs to part {} as {}",
                            id,
                            part.part_id(),
                            record.part(),
                            record.id()
                        )));
                    }
                    if record.state() == RecordState::Destroyed {
                        return Err(ConsistencyError(format!("{} is destroyed", id)));
                    }
                }
            }
        }

        if seen.len() != self.arena.len() {
            return Err(ConsistencyError(format!(
                "{} records indexed but {} held by parts",
                self.arena.len(),
                seen.len()
            )));
        }
        for (part, vessel) in &self.part_vessels {
            if !self.vessels.get(vessel).is_some_and(|v| v.parts.contains(*part)) {
                return Err(ConsistencyError(format!(
                    "part {} is indexed on vessel {} but not held there",
                    part, vessel
                )));
            }
        }
        Ok(())
    }

    // ── Internal helpers ────────────────────────────────────────────────

    /// Registry lookup, warning once per unknown component kind
    fn resolve_kind(&mut self, component_kind: &str) -> Option<ModuleKind> {
        match self.registry.resolve(component_kind) {
            Ok(kind) => Some(kind),
            Err(e) => {
                if self.warned_kinds.insert(component_kind.to_string()) {
                    log::warn!("{}, its modules will have no persisted data", e);
                }
                None
            }
        }
    }

    fn new_permanent_id(&mut self) -> Result<PermanentId, IdError> {
        let arena = &self.arena;
        self.ids.new_permanent_id(|id| arena.contains_permanent(id))
    }

    /// Index a record and file it under its part. The part record is
    /// created on first use.
    fn insert_record(
        &mut self,
        scope: CollectionScope,
        prefab: &Arc<PartPrefab>,
        record: ModuleRecord,
    ) -> bool {
        let (id, part) = (record.id(), record.part());
        if let Err(mut rejected) = self.arena.insert(record) {
            log::error!("{} is already indexed, dropping the new record", id);
            rejected.destroy();
            return false;
        }
        match self.collection_mut(scope) {
            Some(parts) => {
                parts.get_or_insert(part, prefab).push_module(id);
                log::debug!("{} filed on part {} in {:?}", id, part, scope);
                true
            }
            None => {
                log::error!("no collection for {:?}, dropping {}", scope, id);
                if let Some(mut record) = self.arena.remove(&id) {
                    record.destroy();
                }
                false
            }
        }
    }

    /// Destroy and unindex every record of a removed part
    fn destroy_part_records(&mut self, part: &PartRecord) -> usize {
        let mut destroyed = 0;
        for id in part.modules() {
            if let Some(mut record) = self.arena.remove(id) {
                record.destroy();
                destroyed += 1;
            }
            if let ModuleId::Provisional(id) = id {
                self.ids.release_provisional(*id);
            }
        }
        destroyed
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("records", &self.arena.len())
            .field("ship", &self.ship.as_ref().map(|s| s.parts.len()))
            .field("vessels", &self.vessels.len())
            .finish()
    }
}
