//! Docking and undocking. Parts change collection, ids never change.

use hecs::World;

use super::{Database, VesselData};
use crate::error::TransferError;
use crate::host::{find_part, LoadedPart, PartId, VesselId};
use crate::records::PartRecord;

impl Database {
    /// Merge every part of `source` into `target`. The source collection is
    /// left empty; the host discards its vessel with
    /// [`discard_vessel`](Self::discard_vessel). Returns how many parts moved.
    pub fn dock(
        &mut self,
        scene: &mut World,
        source: VesselId,
        target: VesselId,
    ) -> Result<usize, TransferError> {
        if source == target {
            return Err(TransferError::SameVessel(source));
        }
        let held = &self
            .vessels
            .get(&target)
            .ok_or(TransferError::UnknownVessel(target))?
            .parts;
        let incoming = self
            .vessels
            .get(&source)
            .ok_or(TransferError::UnknownVessel(source))?;
        if let Some(part) = incoming.parts.part_ids().into_iter().find(|p| held.contains(*p)) {
            return Err(TransferError::PartCollision {
                part,
                vessel: target,
            });
        }
        let moving = self
            .vessels
            .get_mut(&source)
            .ok_or(TransferError::UnknownVessel(source))?
            .parts
            .drain();

        let moved = self.file_parts(scene, target, moving);
        self.invalidate(source);
        self.invalidate(target);
        log::info!("vessel {} docked into {}, {} parts moved", source, target, moved);
        Ok(moved)
    }

    /// Split `parts` off `source` into a new vessel. Nothing moves unless
    /// every part is on `source`. Returns how many parts moved.
    pub fn undock(
        &mut self,
        scene: &mut World,
        source: VesselId,
        new_vessel: VesselId,
        name: &str,
        parts: &[PartId],
    ) -> Result<usize, TransferError> {
        if source == new_vessel {
            return Err(TransferError::SameVessel(source));
        }
        if self.vessels.contains_key(&new_vessel) {
            return Err(TransferError::VesselExists(new_vessel));
        }
        let from = self
            .vessels
            .get_mut(&source)
            .ok_or(TransferError::UnknownVessel(source))?;
        if let Some(&part) = parts.iter().find(|p| !from.parts.contains(**p)) {
            return Err(TransferError::PartNotInVessel {
                part,
                vessel: source,
            });
        }

        // staged first so the source collection is not walked while it shrinks
        let moving: Vec<PartRecord> = parts
            .iter()
            .filter_map(|part| from.parts.remove(*part))
            .collect();
        let loaded = from.loaded;

        self.vessels
            .insert(new_vessel, VesselData::new(new_vessel, name, loaded));
        let moved = self.file_parts(scene, new_vessel, moving);
        self.invalidate(source);
        log::info!(
            "{} parts undocked from vessel {} as vessel {}",
            moved,
            source,
            new_vessel
        );
        Ok(moved)
    }

    /// File parts under `vessel` and point their loaded entities at it
    fn file_parts(&mut self, scene: &mut World, vessel: VesselId, parts: Vec<PartRecord>) -> usize {
        let mut moved = 0;
        for part in parts {
            let part_id = part.part_id();
            let Some(data) = self.vessels.get_mut(&vessel) else {
                break;
            };
            if !data.parts.insert(part) {
                log::error!("part {} already filed on vessel {}, not moved", part_id, vessel);
                continue;
            }
            self.part_vessels.insert(part_id, vessel);
            if let Some(entity) = find_part(scene, part_id) {
                if let Ok(mut loaded) = scene.get::<&mut LoadedPart>(entity) {
                    loaded.vessel = Some(vessel);
                }
            }
            log::debug!("part {} moved to vessel {}", part_id, vessel);
            moved += 1;
        }
        moved
    }
}
