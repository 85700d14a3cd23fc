//! Host object model consumed by the runtime.
//!
//! Loaded scenes are a `hecs::World`: each loaded part is an entity carrying
//! [`LoadedPart`], and each live component object is an entity carrying
//! [`LiveModule`]. Unloaded vessels are plain [`ProtoVessel`] snapshots.
//! Both carry the identifier fields the host persists for every module.

use hecs::{Entity, World};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::node::ConfigNode;

/// Host identity of a part (stable across save/load in flight)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartId(pub u32);

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host identity of a vessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VesselId(pub u32);

impl fmt::Display for VesselId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static configuration of one module slot on a part template
#[derive(Debug, Clone, PartialEq)]
pub struct ModulePrefab {
    pub component_kind: String,
    pub config: ConfigNode,
}

/// Shared, read-only template of a part
#[derive(Debug, Clone, PartialEq)]
pub struct PartPrefab {
    /// Internal part name
    pub name: String,
    pub title: String,
    pub modules: Vec<Arc<ModulePrefab>>,
}

impl PartPrefab {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            modules: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_module(mut self, component_kind: impl Into<String>, config: ConfigNode) -> Self {
        self.modules.push(Arc::new(ModulePrefab {
            component_kind: component_kind.into(),
            config,
        }));
        self
    }

    /// Template for the module at `index`, if it is of the expected kind
    pub fn module(&self, index: usize, component_kind: &str) -> Option<Arc<ModulePrefab>> {
        self.modules
            .get(index)
            .filter(|m| m.component_kind == component_kind)
            .cloned()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Loaded part entity
#[derive(Debug, Clone)]
pub struct LoadedPart {
    pub part_id: PartId,
    /// `None` while the part sits in the editor
    pub vessel: Option<VesselId>,
    pub prefab: Arc<PartPrefab>,
}

/// Live component object on a loaded part
#[derive(Debug, Clone)]
pub struct LiveModule {
    /// Owning part entity
    pub part: Entity,
    pub component_kind: String,
    /// Position of this module in the part template
    pub module_index: usize,
    pub is_enabled: bool,
    /// Persisted permanent id of the linked record, `0` if none
    pub data_flight_id: u32,
    /// Persisted provisional id of the linked record, `0` if none
    pub data_ship_id: u32,
}

impl LiveModule {
    pub fn new(part: Entity, component_kind: impl Into<String>, module_index: usize) -> Self {
        Self {
            part,
            component_kind: component_kind.into(),
            module_index,
            is_enabled: true,
            data_flight_id: 0,
            data_ship_id: 0,
        }
    }
}

/// Spawn a loaded part and one live module per template slot
pub fn spawn_part(
    scene: &mut World,
    part_id: PartId,
    vessel: Option<VesselId>,
    prefab: Arc<PartPrefab>,
) -> Entity {
    let kinds: Vec<String> = prefab
        .modules
        .iter()
        .map(|m| m.component_kind.clone())
        .collect();

    let part = scene.spawn((LoadedPart {
        part_id,
        vessel,
        prefab,
    },));

    for (index, kind) in kinds.into_iter().enumerate() {
        scene.spawn((LiveModule::new(part, kind, index),));
    }

    part
}

/// Live module entities of a part, in template order
pub fn live_modules(scene: &World, part: Entity) -> Vec<Entity> {
    let mut modules: Vec<(usize, Entity)> = scene
        .query::<&LiveModule>()
        .iter()
        .filter(|(_, module)| module.part == part)
        .map(|(entity, module)| (module.module_index, entity))
        .collect();
    modules.sort_by_key(|(index, _)| *index);
    modules.into_iter().map(|(_, entity)| entity).collect()
}

pub fn find_part(scene: &World, part_id: PartId) -> Option<Entity> {
    scene
        .query::<&LoadedPart>()
        .iter()
        .find(|(_, part)| part.part_id == part_id)
        .map(|(entity, _)| entity)
}

/// Despawn a part and its live modules
pub fn despawn_part(scene: &mut World, part: Entity) {
    for module in live_modules(scene, part) {
        let _ = scene.despawn(module);
    }
    let _ = scene.despawn(part);
}

/// Persisted snapshot of one module of an unloaded part
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoModule {
    pub component_kind: String,
    pub is_enabled: bool,
    /// `0` if no record was ever linked
    pub data_flight_id: u32,
}

/// Persisted snapshot of an unloaded part
#[derive(Debug, Clone)]
pub struct ProtoPart {
    pub part_id: PartId,
    pub prefab: Arc<PartPrefab>,
    pub modules: Vec<ProtoModule>,
}

impl ProtoPart {
    /// Snapshot with one enabled, never-linked module per template slot
    pub fn from_prefab(part_id: PartId, prefab: Arc<PartPrefab>) -> Self {
        let modules = prefab
            .modules
            .iter()
            .map(|m| ProtoModule {
                component_kind: m.component_kind.clone(),
                is_enabled: true,
                data_flight_id: 0,
            })
            .collect();
        Self {
            part_id,
            prefab,
            modules,
        }
    }
}

/// Persisted snapshot of an unloaded vessel
#[derive(Debug, Clone)]
pub struct ProtoVessel {
    pub vessel_id: VesselId,
    pub name: String,
    pub parts: Vec<ProtoPart>,
}

impl ProtoVessel {
    /// Snapshot a loaded vessel, keeping the ids written on its live modules
    pub fn from_scene(scene: &World, vessel_id: VesselId, name: &str, parts: &[Entity]) -> Self {
        let mut protos = Vec::with_capacity(parts.len());
        for &part in parts {
            let Ok(loaded) = scene.get::<&LoadedPart>(part) else {
                continue;
            };
            let modules = live_modules(scene, part)
                .into_iter()
                .filter_map(|entity| scene.get::<&LiveModule>(entity).ok())
                .map(|live| ProtoModule {
                    component_kind: live.component_kind.clone(),
                    is_enabled: live.is_enabled,
                    data_flight_id: live.data_flight_id,
                })
                .collect();
            protos.push(ProtoPart {
                part_id: loaded.part_id,
                prefab: loaded.prefab.clone(),
                modules,
            });
        }
        Self {
            vessel_id,
            name: name.to_string(),
            parts: protos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tank() -> Arc<PartPrefab> {
        PartPrefab::new("tank")
            .with_module("ModuleA", ConfigNode::new("MODULE"))
            .with_module("ModuleB", ConfigNode::new("MODULE"))
            .into_shared()
    }

    #[test]
    fn test_spawn_part_creates_live_modules_in_order() {
        let mut scene = World::new();
        let part = spawn_part(&mut scene, PartId(1), None, tank());
        let modules = live_modules(&scene, part);
        assert_eq!(modules.len(), 2);

        let first = scene.get::<&LiveModule>(modules[0]).unwrap();
        assert_eq!(first.component_kind, "ModuleA");
        assert_eq!(first.data_flight_id, 0);
        assert_eq!(find_part(&scene, PartId(1)), Some(part));
    }

    #[test]
    fn test_despawn_part_removes_modules() {
        let mut scene = World::new();
        let part = spawn_part(&mut scene, PartId(1), None, tank());
        despawn_part(&mut scene, part);
        assert_eq!(scene.query::<&LiveModule>().iter().count(), 0);
        assert!(find_part(&scene, PartId(1)).is_none());
    }

    #[test]
    fn test_prefab_module_lookup_checks_kind() {
        let prefab = tank();
        assert!(prefab.module(1, "ModuleB").is_some());
        assert!(prefab.module(1, "ModuleA").is_none());
        assert!(prefab.module(5, "ModuleA").is_none());
    }

    #[test]
    fn test_proto_from_scene_keeps_ids() {
        let mut scene = World::new();
        let part = spawn_part(&mut scene, PartId(3), Some(VesselId(1)), tank());
        let module = live_modules(&scene, part)[0];
        scene.get::<&mut LiveModule>(module).unwrap().data_flight_id = 77;

        let proto = ProtoVessel::from_scene(&scene, VesselId(1), "Lander", &[part]);
        assert_eq!(proto.parts.len(), 1);
        assert_eq!(proto.parts[0].modules[0].data_flight_id, 77);
        assert_eq!(proto.parts[0].modules[1].data_flight_id, 0);
    }
}
