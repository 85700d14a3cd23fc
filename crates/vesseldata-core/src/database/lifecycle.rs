//! Flight protocols: creation, loading, relinking, destruction and flight
//! saves.

use hecs::{Entity, World};

use super::ship::write_live_ids;
use super::{Database, VesselData};
use crate::codec::{self, NodeIndex, SaveTarget};
use crate::error::LifecycleError;
use crate::host::{live_modules, LiveModule, LoadedPart, PartId, ProtoVessel, VesselId};
use crate::ids::{ModuleId, PermanentId};
use crate::node::ConfigNode;
use crate::persistence::SavedVessel;
use crate::records::{CollectionScope, ModuleRecord, RecordState};

const NODE_VESSEL: &str = "VESSEL";

/// What the recovery path did for one live module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The module was already linked to its record
    AlreadyLinked,
    /// An existing record was linked again
    Relinked(PermanentId),
    /// No usable record existed; a new one was created
    Created(PermanentId),
    /// The component kind has no data kind
    Skipped,
}

/// Per-module outcomes of loading a vessel into the scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub already_linked: usize,
    pub relinked: usize,
    pub created: usize,
    pub skipped: usize,
    /// Modules left without a record because no id could be allocated
    pub failed: usize,
}

impl LoadReport {
    fn count(&mut self, outcome: RecoveryOutcome) {
        match outcome {
            RecoveryOutcome::AlreadyLinked => self.already_linked += 1,
            RecoveryOutcome::Relinked(_) => self.relinked += 1,
            RecoveryOutcome::Created(_) => self.created += 1,
            RecoveryOutcome::Skipped => self.skipped += 1,
        }
    }
}

impl Database {
    /// Find the record of a live module in flight, or create one.
    ///
    /// A stored id that resolves to a record of the same kind on the same
    /// part is relinked. Anything else is treated as a first in-flight
    /// instantiation with a new id. Calling this again for the same module
    /// finds the linked record and does nothing.
    pub fn get_or_create_flight_record(
        &mut self,
        scene: &mut World,
        module: Entity,
    ) -> Result<RecoveryOutcome, LifecycleError> {
        let (part, kind_name, index, flight_id, is_enabled) = {
            let live = scene
                .get::<&LiveModule>(module)
                .map_err(|_| LifecycleError::NotALiveModule(module))?;
            (
                live.part,
                live.component_kind.clone(),
                live.module_index,
                live.data_flight_id,
                live.is_enabled,
            )
        };
        let (part_id, vessel, prefab) = {
            let loaded = scene
                .get::<&LoadedPart>(part)
                .map_err(|_| LifecycleError::NotALoadedPart(part))?;
            (loaded.part_id, loaded.vessel, loaded.prefab.clone())
        };
        let vessel = self
            .vessel_of(part_id)
            .or(vessel)
            .ok_or(LifecycleError::PartNotInFlight(part_id))?;
        if !self.vessels.contains_key(&vessel) {
            return Err(LifecycleError::UnknownVessel(vessel));
        }
        let Some(kind) = self.resolve_kind(&kind_name) else {
            return Ok(RecoveryOutcome::Skipped);
        };

        if let Some(stored) = PermanentId::new(flight_id) {
            match self.arena.get_mut(&ModuleId::Permanent(stored)) {
                Some(record) if record.part() == part_id && record.kind() == kind => {
                    if record.live() == Some(module) && record.state() == RecordState::Started {
                        return Ok(RecoveryOutcome::AlreadyLinked);
                    }
                    record.link(module);
                    log::debug!("{} relinked on part {}", record.id(), part_id);
                    return Ok(RecoveryOutcome::Relinked(stored));
                }
                Some(record) => log::warn!(
                    "module {} of part {} carries {}, which belongs to {} on part {}; recreating",
                    index,
                    part_id,
                    stored,
                    record.data_kind(),
                    record.part()
                ),
                None => log::debug!(
                    "module {} of part {} carries unknown {}, recreating",
                    index,
                    part_id,
                    stored
                ),
            }
        }

        let id = self.new_permanent_id()?;
        let mut record = ModuleRecord::new(
            kind,
            ModuleId::Permanent(id),
            part_id,
            prefab.module(index, &kind_name),
        );
        record.set_enabled(is_enabled);
        record.set_state(RecordState::AwaitingRelink);
        record.first_instantiate(None);
        record.start(Some(module));

        if !self.insert_record(CollectionScope::Vessel(vessel), &prefab, record) {
            return Ok(RecoveryOutcome::Skipped);
        }
        self.part_vessels.insert(part_id, vessel);
        write_live_ids(scene, module, id.get(), 0);
        self.invalidate(vessel);
        Ok(RecoveryOutcome::Created(id))
    }

    /// A vessel appeared in flight with no saved state, e.g. spawned by the
    /// host. Every live module gets a new record.
    pub fn vessel_created_loaded(
        &mut self,
        scene: &mut World,
        vessel: VesselId,
        name: &str,
        parts: &[Entity],
    ) -> Result<LoadReport, LifecycleError> {
        if self.vessels.contains_key(&vessel) {
            return Err(LifecycleError::VesselExists(vessel));
        }
        self.vessels.insert(vessel, VesselData::new(vessel, name, false));
        let report = self.vessel_loaded(scene, vessel, parts);
        if report.is_err() {
            // vessel_loaded validates before it files anything
            self.vessels.shift_remove(&vessel);
        }
        report
    }

    /// A known vessel entered the scene. Records are relinked to their live
    /// modules without rerunning any initialization hook; modules with no
    /// usable record go through the recovery path.
    ///
    /// A module whose recovery fails is logged and counted in
    /// [`LoadReport::failed`]; the rest of the vessel still loads.
    pub fn vessel_loaded(
        &mut self,
        scene: &mut World,
        vessel: VesselId,
        parts: &[Entity],
    ) -> Result<LoadReport, LifecycleError> {
        if !self.vessels.contains_key(&vessel) {
            return Err(LifecycleError::UnknownVessel(vessel));
        }
        if let Some(&part) = parts.iter().find(|p| scene.get::<&LoadedPart>(**p).is_err()) {
            return Err(LifecycleError::NotALoadedPart(part));
        }
        if let Some(data) = self.vessels.get_mut(&vessel) {
            data.loaded = true;
        }

        let mut report = LoadReport::default();
        for &part in parts {
            let (part_id, prefab) = {
                let Ok(mut loaded) = scene.get::<&mut LoadedPart>(part) else {
                    continue;
                };
                loaded.vessel = Some(vessel);
                (loaded.part_id, loaded.prefab.clone())
            };
            match self.vessel_of(part_id) {
                Some(other) if other != vessel => {
                    log::warn!("part {} loaded on vessel {} but filed on {}", part_id, vessel, other);
                }
                Some(_) => {}
                None => {
                    if let Some(parts) = self.collection_mut(CollectionScope::Vessel(vessel)) {
                        parts.get_or_insert(part_id, &prefab);
                    }
                    self.part_vessels.insert(part_id, vessel);
                }
            }
            for module in live_modules(scene, part) {
                match self.get_or_create_flight_record(scene, module) {
                    Ok(outcome) => report.count(outcome),
                    Err(e) => {
                        log::warn!("module {:?} on part {} has no record: {}", module, part_id, e);
                        report.failed += 1;
                    }
                }
            }
        }

        log::info!(
            "vessel {} loaded: {} relinked, {} created, {} skipped, {} failed",
            vessel,
            report.relinked,
            report.created,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Restore an unloaded vessel from its snapshot and saved node.
    ///
    /// Modules whose node is missing, corrupt, of another kind or already
    /// indexed start fresh with a new id, written back into the snapshot.
    /// A module no id can be allocated for is left without a record and its
    /// snapshot id is cleared. Every record ends up `Suspended`. Returns how
    /// many were restored from the node.
    pub fn load_vessel(
        &mut self,
        proto: &mut ProtoVessel,
        node: Option<&ConfigNode>,
    ) -> Result<usize, LifecycleError> {
        let vessel = proto.vessel_id;
        if self.vessels.contains_key(&vessel) {
            return Err(LifecycleError::VesselExists(vessel));
        }
        self.vessels.insert(vessel, VesselData::new(vessel, &proto.name, false));
        let scope = CollectionScope::Vessel(vessel);
        let mut index = NodeIndex::from_parent(node);

        let mut restored = 0;
        for part in &mut proto.parts {
            if let Some(other) = self.vessel_of(part.part_id) {
                log::warn!("part {} is already on vessel {}, skipping it", part.part_id, other);
                continue;
            }
            if let Some(parts) = self.collection_mut(scope) {
                parts.get_or_insert(part.part_id, &part.prefab);
            }
            self.part_vessels.insert(part.part_id, vessel);

            for (slot, proto_module) in part.modules.iter_mut().enumerate() {
                let Some(kind) = self.resolve_kind(&proto_module.component_kind) else {
                    continue;
                };
                let module_prefab = part.prefab.module(slot, &proto_module.component_kind);

                let decoded = PermanentId::new(proto_module.data_flight_id)
                    .and_then(|id| index.take(ModuleId::Permanent(id)))
                    .and_then(|node| {
                        self.decode_for_slot(&node, kind, part.part_id, module_prefab.clone())
                    });

                let (mut record, from_node) = match decoded {
                    Some(record) => (record, true),
                    None => {
                        let id = match self.new_permanent_id() {
                            Ok(id) => id,
                            Err(e) => {
                                log::warn!(
                                    "{} on part {} left without a record: {}",
                                    kind.data_kind,
                                    part.part_id,
                                    e
                                );
                                proto_module.data_flight_id = 0;
                                continue;
                            }
                        };
                        let mut record =
                            ModuleRecord::new(kind, ModuleId::Permanent(id), part.part_id, module_prefab);
                        record.set_enabled(proto_module.is_enabled);
                        record.first_instantiate(Some(&*proto_module));
                        (record, false)
                    }
                };
                record.start(None);
                let id = record.id();
                if !self.insert_record(scope, &part.prefab, record) {
                    proto_module.data_flight_id = 0;
                    continue;
                }
                proto_module.data_flight_id = id.raw();
                if from_node {
                    restored += 1;
                }
            }
        }

        index.warn_leftovers(&format!("vessel {}", vessel));
        log::info!("vessel {} `{}` loaded with {} restored records", vessel, proto.name, restored);
        Ok(restored)
    }

    /// A vessel left the scene. Its records stay indexed, without live links.
    pub fn vessel_unloaded(&mut self, vessel: VesselId) -> Result<usize, LifecycleError> {
        let data = self
            .vessels
            .get_mut(&vessel)
            .ok_or(LifecycleError::UnknownVessel(vessel))?;
        data.loaded = false;
        let ids: Vec<ModuleId> = data.parts.module_ids().collect();

        let mut suspended = 0;
        for id in ids {
            if let Some(record) = self.arena.get_mut(&id) {
                record.suspend();
                suspended += 1;
            }
        }
        log::debug!("vessel {} unloaded, {} records suspended", vessel, suspended);
        Ok(suspended)
    }

    /// A live module went away while its part lives on. Only the link is
    /// cleared.
    pub fn live_module_destroyed(&mut self, module: Entity) -> bool {
        let linked = self
            .arena
            .iter()
            .find(|record| record.live() == Some(module))
            .map(ModuleRecord::id);
        match linked.and_then(|id| self.arena.get_mut(&id)) {
            Some(record) => {
                record.suspend();
                true
            }
            None => false,
        }
    }

    /// A part was destroyed, in the editor or in flight. Every record on it
    /// is destroyed and leaves the index.
    pub fn part_destroyed(&mut self, part: PartId) -> usize {
        let Some(scope) = self.scope_of(part) else {
            return 0;
        };
        let Some(removed) = self.collection_mut(scope).and_then(|parts| parts.remove(part)) else {
            return 0;
        };
        self.part_vessels.remove(&part);
        if let CollectionScope::Vessel(vessel) = scope {
            self.invalidate(vessel);
        }
        let destroyed = self.destroy_part_records(&removed);
        log::debug!("part {} destroyed with {} records", part, destroyed);
        destroyed
    }

    /// A vessel was destroyed. Every record on it is destroyed.
    pub fn vessel_destroyed(&mut self, vessel: VesselId) -> Result<usize, LifecycleError> {
        let mut data = self
            .vessels
            .shift_remove(&vessel)
            .ok_or(LifecycleError::UnknownVessel(vessel))?;
        let mut destroyed = 0;
        for part in data.parts.drain() {
            self.part_vessels.remove(&part.part_id());
            destroyed += self.destroy_part_records(&part);
        }
        log::info!("vessel {} destroyed with {} records", vessel, destroyed);
        Ok(destroyed)
    }

    /// Drop a vessel the host discarded, normally one emptied by docking
    pub fn discard_vessel(&mut self, vessel: VesselId) -> Result<(), LifecycleError> {
        let parts = self
            .vessels
            .get(&vessel)
            .ok_or(LifecycleError::UnknownVessel(vessel))?
            .parts
            .len();
        if parts > 0 {
            log::warn!("discarding vessel {} which still holds {} parts", vessel, parts);
        }
        self.vessel_destroyed(vessel).map(|_| ())
    }

    /// Saved node of one vessel
    pub fn save_vessel(&self, vessel: VesselId) -> Result<ConfigNode, LifecycleError> {
        self.vessels
            .get(&vessel)
            .map(|data| self.vessel_node(data))
            .ok_or(LifecycleError::UnknownVessel(vessel))
    }

    fn vessel_node(&self, data: &VesselData) -> ConfigNode {
        let mut node = ConfigNode::new(NODE_VESSEL);
        node.add_value("name", &data.name);
        node.add_node(codec::save_modules(&data.parts, &self.arena, SaveTarget::Flight));
        node
    }

    /// Saved nodes of every flight vessel
    pub fn save_flight(&self) -> Vec<SavedVessel> {
        self.vessels
            .values()
            .map(|data| SavedVessel {
                vessel_id: data.id,
                name: data.name.clone(),
                node: self.vessel_node(data),
            })
            .collect()
    }

    /// Drop every record, vessel and ship session without running any hook.
    /// Used before a save is loaded.
    pub fn clear(&mut self) {
        log::debug!("clearing {} records", self.arena.len());
        self.arena.clear();
        self.vessels.clear();
        self.part_vessels.clear();
        self.ship = None;
        self.ids.end_session();
    }

    /// Replace all flight state with a save. Every vessel comes back
    /// unloaded. Returns how many records were restored from nodes.
    pub fn load_flight(
        &mut self,
        protos: &mut [ProtoVessel],
        saved: &[SavedVessel],
    ) -> Result<usize, LifecycleError> {
        self.clear();
        let mut restored = 0;
        for proto in protos.iter_mut() {
            let node = saved
                .iter()
                .find(|s| s.vessel_id == proto.vessel_id)
                .map(|s| &s.node);
            restored += self.load_vessel(proto, node)?;
        }
        log::info!("flight loaded: {} vessels, {} records restored", protos.len(), restored);
        Ok(restored)
    }
}
