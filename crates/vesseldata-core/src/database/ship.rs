//! Editor session and launch.

use hecs::{Entity, World};
use std::sync::Arc;

use super::{Database, ShipSession, VesselData};
use crate::codec::{self, NodeIndex, SaveTarget};
use crate::error::{LaunchError, LifecycleError};
use crate::host::{find_part, live_modules, LiveModule, LoadedPart, ModulePrefab, PartId, VesselId};
use crate::ids::{ModuleId, ProvisionalId};
use crate::node::ConfigNode;
use crate::records::{CollectionScope, ModuleRecord};
use crate::registry::ModuleKind;

const NODE_SHIP: &str = "SHIP";

impl Database {
    /// Start a new editor session, ending any previous one
    pub fn begin_ship_session(&mut self, name: &str) {
        if self.ship.is_some() {
            self.end_ship_session();
        }
        log::debug!("ship session `{}` started", name);
        self.ship = Some(ShipSession::new(name));
    }

    /// Destroy every ship record and drop the provisional namespace
    pub fn end_ship_session(&mut self) -> usize {
        let Some(mut ship) = self.ship.take() else {
            return 0;
        };
        let destroyed: usize = ship
            .parts
            .drain()
            .iter()
            .map(|part| self.destroy_part_records(part))
            .sum();
        self.ids.end_session();
        log::debug!(
            "ship session `{}` ended, {} records destroyed",
            ship.name,
            destroyed
        );
        destroyed
    }

    /// A part was placed in the editor. Creates a record with a provisional
    /// id for each live module that has none yet.
    pub fn ship_part_added(&mut self, scene: &mut World, part: Entity) -> Result<usize, LifecycleError> {
        let (part_id, prefab) = {
            let loaded = scene
                .get::<&LoadedPart>(part)
                .map_err(|_| LifecycleError::NotALoadedPart(part))?;
            (loaded.part_id, loaded.prefab.clone())
        };
        let ship = self.ship.as_mut().ok_or(LifecycleError::NoShipSession)?;
        ship.parts.get_or_insert(part_id, &prefab);

        let mut created = 0;
        for module in live_modules(scene, part) {
            let (kind_name, index, ship_id) = {
                let Ok(live) = scene.get::<&LiveModule>(module) else {
                    continue;
                };
                (live.component_kind.clone(), live.module_index, live.data_ship_id)
            };
            let linked = ProvisionalId::new(ship_id)
                .and_then(|id| self.arena.get(&ModuleId::Provisional(id)))
                .is_some_and(|r| r.live() == Some(module));
            if linked {
                continue;
            }
            let Some(kind) = self.resolve_kind(&kind_name) else {
                continue;
            };

            let id = self.ids.new_provisional_id()?;
            let mut record = ModuleRecord::new(
                kind,
                ModuleId::Provisional(id),
                part_id,
                prefab.module(index, &kind_name),
            );
            record.first_instantiate(None);
            record.start(Some(module));
            if self.insert_record(CollectionScope::Ship, &prefab, record) {
                write_live_ids(scene, module, 0, id.get());
                created += 1;
            }
        }
        Ok(created)
    }

    /// A part was deleted in the editor
    pub fn ship_part_removed(&mut self, part: PartId) -> usize {
        let Some(removed) = self.ship.as_mut().and_then(|s| s.parts.remove(part)) else {
            return 0;
        };
        self.destroy_part_records(&removed)
    }

    /// Craft node of the ship being edited
    pub fn save_ship(&self) -> Result<ConfigNode, LifecycleError> {
        let ship = self.ship.as_ref().ok_or(LifecycleError::NoShipSession)?;
        let mut node = ConfigNode::new(NODE_SHIP);
        node.add_value("name", &ship.name);
        node.add_node(codec::save_modules(&ship.parts, &self.arena, SaveTarget::Craft));
        Ok(node)
    }

    /// Open a craft in a new session. Every editor part in `scene` gets its
    /// records back by provisional id; modules without a usable node start
    /// fresh. Returns how many records were restored.
    pub fn load_ship(&mut self, scene: &mut World, craft: &ConfigNode) -> Result<usize, LifecycleError> {
        let name = craft.get_value("name").unwrap_or("Untitled").to_string();
        self.begin_ship_session(&name);
        let mut index = NodeIndex::from_parent(Some(craft));
        // saved ids are reserved up front so fresh ids can't take them
        for id in index.ids().filter_map(ModuleId::provisional) {
            self.ids.claim_provisional(id);
        }

        let mut parts: Vec<(PartId, Entity)> = scene
            .query::<&LoadedPart>()
            .iter()
            .filter(|(_, loaded)| loaded.vessel.is_none())
            .map(|(entity, loaded)| (loaded.part_id, entity))
            .collect();
        parts.sort_by_key(|(part_id, _)| *part_id);

        let mut restored = 0;
        for (part_id, part) in parts {
            let prefab = match scene.get::<&LoadedPart>(part) {
                Ok(loaded) => loaded.prefab.clone(),
                Err(_) => continue,
            };
            if let Some(ship) = self.ship.as_mut() {
                ship.parts.get_or_insert(part_id, &prefab);
            }
            for module in live_modules(scene, part) {
                let (kind_name, index_in_part, ship_id) = {
                    let Ok(live) = scene.get::<&LiveModule>(module) else {
                        continue;
                    };
                    (live.component_kind.clone(), live.module_index, live.data_ship_id)
                };
                let Some(kind) = self.resolve_kind(&kind_name) else {
                    continue;
                };
                let module_prefab = prefab.module(index_in_part, &kind_name);

                let mut decoded = None;
                if let Some(id) = ProvisionalId::new(ship_id) {
                    if let Some(node) = index.take(ModuleId::Provisional(id)) {
                        decoded = self.decode_for_slot(&node, kind, part_id, module_prefab.clone());
                        if decoded.is_none() {
                            self.ids.release_provisional(id);
                        }
                    }
                }

                let mut record = match decoded {
                    Some(record) => {
                        restored += 1;
                        record
                    }
                    None => {
                        let id = self.ids.new_provisional_id()?;
                        let mut record =
                            ModuleRecord::new(kind, ModuleId::Provisional(id), part_id, module_prefab);
                        record.first_instantiate(None);
                        record
                    }
                };
                record.start(Some(module));
                let ship_id = record.id().raw();
                if self.insert_record(CollectionScope::Ship, &prefab, record) {
                    write_live_ids(scene, module, 0, ship_id);
                }
            }
        }

        index.warn_leftovers("craft");
        for id in index.ids().filter_map(ModuleId::provisional) {
            self.ids.release_provisional(id);
        }
        log::info!("craft `{}` loaded, {} records restored", name, restored);
        Ok(restored)
    }

    /// Turn the ship into flight vessel `vessel_id`.
    ///
    /// Every provisional id is promoted to a permanent id in one batch. If
    /// any promotion fails nothing changes: the ship session is left exactly
    /// as it was and no permanent id enters the index.
    pub fn launch(&mut self, scene: &mut World, vessel_id: VesselId, name: &str) -> Result<usize, LaunchError> {
        if self.vessels.contains_key(&vessel_id) {
            return Err(LaunchError::VesselExists(vessel_id));
        }
        let ship = self.ship.as_ref().ok_or(LaunchError::NoShipSession)?;
        if let Some((part, vessel)) = ship
            .parts
            .part_ids()
            .into_iter()
            .find_map(|p| self.vessel_of(p).map(|v| (p, v)))
        {
            return Err(LaunchError::PartInFlight { part, vessel });
        }
        let mut ship = self.ship.take().ok_or(LaunchError::NoShipSession)?;

        let provisional: Vec<ProvisionalId> = ship.parts.module_ids().filter_map(ModuleId::provisional).collect();
        let plan = {
            let arena = &self.arena;
            self.ids.plan_promotion(&provisional, |id| arena.contains_permanent(id))
        };
        let plan = match plan {
            Ok(plan) => plan,
            Err(failure) => {
                log::error!(
                    "launch of `{}` aborted at record {} of {}: {}",
                    ship.name,
                    failure.failed_at,
                    provisional.len(),
                    failure.source
                );
                self.ship = Some(ship);
                return Err(LaunchError::PartialPromotion {
                    failed_at: failure.failed_at,
                    total: provisional.len(),
                    source: failure.source,
                });
            }
        };
        self.ids.commit_promotion(&plan);

        let mut vessel = VesselData::new(vessel_id, name, true);
        let mut promoted = 0;
        for mut part in ship.parts.drain() {
            for module in part.modules_mut() {
                let Some(permanent) = module.provisional().and_then(|p| plan.get(p)) else {
                    continue;
                };
                let Some(mut record) = self.arena.remove(module) else {
                    continue;
                };
                record.set_id(ModuleId::Permanent(permanent));
                if let Some(live) = record.live() {
                    write_live_ids(scene, live, permanent.get(), 0);
                }
                *module = ModuleId::Permanent(permanent);
                if let Err(record) = self.arena.insert(record) {
                    log::error!("{} collided during launch", record.id());
                    continue;
                }
                promoted += 1;
            }

            if let Some(entity) = find_part(scene, part.part_id()) {
                if let Ok(mut loaded) = scene.get::<&mut LoadedPart>(entity) {
                    loaded.vessel = Some(vessel_id);
                }
            }
            self.part_vessels.insert(part.part_id(), vessel_id);
            vessel.parts.insert(part);
        }

        self.ids.end_session();
        self.vessels.insert(vessel_id, vessel);
        log::info!(
            "launched `{}` as vessel {} with {} records",
            name,
            vessel_id,
            promoted
        );
        Ok(promoted)
    }

    /// Decode a node for a known module slot. Nodes of another kind, corrupt
    /// nodes and ids already indexed give `None`.
    pub(super) fn decode_for_slot(
        &self,
        node: &ConfigNode,
        kind: ModuleKind,
        part: PartId,
        prefab: Option<Arc<ModulePrefab>>,
    ) -> Option<ModuleRecord> {
        if codec::data_kind_of(node) != Some(kind.data_kind) {
            log::warn!(
                "node `{}` does not hold {}, discarding it",
                node.name,
                kind.data_kind
            );
            return None;
        }
        match codec::decode_record(node, &self.registry, part, prefab) {
            Ok(record) if self.arena.contains(&record.id()) => {
                log::warn!("discarding node `{}`: {} is already indexed", node.name, record.id());
                None
            }
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("discarding module node: {}", e);
                None
            }
        }
    }
}

/// Write the persisted ids of a live module
pub(super) fn write_live_ids(scene: &mut World, module: Entity, flight_id: u32, ship_id: u32) {
    if let Ok(mut live) = scene.get::<&mut LiveModule>(module) {
        live.data_flight_id = flight_id;
        live.data_ship_id = ship_id;
    }
}
