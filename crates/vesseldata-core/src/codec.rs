//! Persistence codec: module records to and from [`ConfigNode`]s.
//!
//! Every record becomes one child of a `MODULES` node, named
//! `{part name}@{data kind}#{id}`. The id suffix keeps two modules of the same
//! kind on the same part apart. The id itself is written as a tagged value:
//! `flightId` for permanent ids, `shipId` for provisional ids. Provisional ids
//! only ever appear in craft files.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RecordError;
use crate::host::{ModulePrefab, PartId};
use crate::ids::{ModuleId, PermanentId, ProvisionalId};
use crate::node::ConfigNode;
use crate::records::{ModuleArena, ModuleRecord, PartCollection};
use crate::registry::TypeRegistry;

pub const NODE_MODULES: &str = "MODULES";
pub const VALUE_FLIGHT_ID: &str = "flightId";
pub const VALUE_SHIP_ID: &str = "shipId";
pub const VALUE_ENABLED: &str = "moduleIsEnabled";

/// What a save is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    /// A flight save. Provisional records are never written.
    Flight,
    /// A craft file of the ship being edited
    Craft,
}

pub fn node_name(part_name: &str, data_kind: &str, id: ModuleId) -> String {
    format!("{}@{}#{}", part_name, data_kind, id.raw())
}

/// Data kind encoded in a node name
pub fn data_kind_of(node: &ConfigNode) -> Option<&str> {
    let (head, _) = node.name.rsplit_once('#')?;
    let (_, kind) = head.rsplit_once('@')?;
    Some(kind).filter(|k| !k.is_empty())
}

/// Encode one record. Returns `None` for a provisional record in a flight
/// save.
pub fn encode_record(
    record: &ModuleRecord,
    part_name: &str,
    target: SaveTarget,
) -> Option<ConfigNode> {
    let id = record.id();
    let mut node = ConfigNode::new(node_name(part_name, record.data_kind(), id));
    match (id, target) {
        (ModuleId::Permanent(id), _) => node.add_value(VALUE_FLIGHT_ID, id),
        (ModuleId::Provisional(id), SaveTarget::Craft) => node.add_value(VALUE_SHIP_ID, id),
        (ModuleId::Provisional(_), SaveTarget::Flight) => {
            log::warn!(
                "not writing {} {} to a flight save, it was never launched",
                record.data_kind(),
                id
            );
            return None;
        }
    }
    node.add_value(VALUE_ENABLED, record.is_enabled());
    record.data().on_save(&mut node);
    Some(node)
}

/// Read the tagged id of a node
pub fn decode_id(node: &ConfigNode) -> Result<ModuleId, RecordError> {
    let corrupt = |reason| RecordError::Corrupt {
        node: node.name.clone(),
        reason,
    };
    if let Some(raw) = node.get_value(VALUE_FLIGHT_ID) {
        return raw
            .trim()
            .parse()
            .ok()
            .and_then(PermanentId::new)
            .map(ModuleId::Permanent)
            .ok_or_else(|| corrupt("invalid flightId"));
    }
    if let Some(raw) = node.get_value(VALUE_SHIP_ID) {
        return raw
            .trim()
            .parse()
            .ok()
            .and_then(ProvisionalId::new)
            .map(ModuleId::Provisional)
            .ok_or_else(|| corrupt("invalid shipId"));
    }
    Err(corrupt("missing id"))
}

/// Build a record from its node and run `on_load`.
///
/// The record comes back `Instantiated`; the caller starts it. A failed
/// `on_load` does not fail decoding, it disables the record.
pub fn decode_record(
    node: &ConfigNode,
    registry: &TypeRegistry,
    part: PartId,
    prefab: Option<Arc<ModulePrefab>>,
) -> Result<ModuleRecord, RecordError> {
    let id = decode_id(node)?;
    let data_kind = data_kind_of(node).ok_or_else(|| RecordError::Corrupt {
        node: node.name.clone(),
        reason: "missing data kind",
    })?;
    let kind = registry.resolve_data_kind(data_kind)?;

    let mut record = ModuleRecord::new(kind, id, part, prefab);
    record.set_enabled(node.value_or(VALUE_ENABLED, true));
    record.load(node);
    Ok(record)
}

/// Encode every record of a collection, part by part
pub fn save_modules(parts: &PartCollection, arena: &ModuleArena, target: SaveTarget) -> ConfigNode {
    let mut modules = ConfigNode::new(NODE_MODULES);
    for part in parts.iter() {
        for id in part.modules() {
            match arena.get(id) {
                Some(record) => {
                    if let Some(node) = encode_record(record, part.name(), target) {
                        modules.add_node(node);
                    }
                }
                None => log::warn!("part {} lists {} but no such record exists", part.part_id(), id),
            }
        }
    }
    modules
}

/// Persisted module nodes indexed by id, consumed as records are restored
#[derive(Debug, Default)]
pub struct NodeIndex {
    nodes: HashMap<ModuleId, ConfigNode>,
}

impl NodeIndex {
    /// Index the children of a `MODULES` node. Corrupt nodes and repeated ids
    /// are discarded.
    pub fn build(modules: &ConfigNode) -> Self {
        let mut nodes = HashMap::new();
        for node in modules.nodes() {
            let id = match decode_id(node) {
                Ok(id) => id,
                Err(e) => {
                    log::warn!("discarding module node: {}", e);
                    continue;
                }
            };
            if nodes.contains_key(&id) {
                log::warn!(
                    "discarding module node `{}`: {}",
                    node.name,
                    RecordError::DuplicateIdentifier(id)
                );
                continue;
            }
            nodes.insert(id, node.clone());
        }
        Self { nodes }
    }

    /// Index the `MODULES` child of a vessel or ship node, if any
    pub fn from_parent(parent: Option<&ConfigNode>) -> Self {
        parent
            .and_then(|p| p.get_node(NODE_MODULES))
            .map(Self::build)
            .unwrap_or_default()
    }

    pub fn take(&mut self, id: ModuleId) -> Option<ConfigNode> {
        self.nodes.remove(&id)
    }

    /// Ids of the nodes not taken yet
    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Log nodes no module slot asked for
    pub fn warn_leftovers(&self, scope: &str) {
        for node in self.nodes.values() {
            log::warn!("{}: no module matches node `{}`, dropping it", scope, node.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{HabitatData, ProcessControllerData};
    use crate::records::{CollectionScope, PartRecord};
    use crate::registry::ModuleKind;
    use crate::host::PartPrefab;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register_set(
            "test",
            [
                ModuleKind::of::<HabitatData>(),
                ModuleKind::of::<ProcessControllerData>(),
            ],
        );
        registry
    }

    fn perm(raw: u32) -> ModuleId {
        ModuleId::Permanent(PermanentId::new(raw).unwrap())
    }

    fn prov(raw: u32) -> ModuleId {
        ModuleId::Provisional(ProvisionalId::new(raw).unwrap())
    }

    fn habitat(id: ModuleId, volume: f64) -> ModuleRecord {
        let mut record = ModuleRecord::new(ModuleKind::of::<HabitatData>(), id, PartId(1), None);
        record.downcast_mut::<HabitatData>().unwrap().volume = volume;
        record
    }

    #[test]
    fn test_node_names_disambiguate_same_kind() {
        let a = encode_record(&habitat(perm(10), 1.0), "hab", SaveTarget::Flight).unwrap();
        let b = encode_record(&habitat(perm(11), 1.0), "hab", SaveTarget::Flight).unwrap();
        assert_ne!(a.name, b.name);
        assert_eq!(a.name, "hab@HabitatData#10");
        assert_eq!(data_kind_of(&a), Some("HabitatData"));
    }

    #[test]
    fn test_provisional_never_in_flight_save() {
        let record = habitat(prov(3), 1.0);
        assert!(encode_record(&record, "hab", SaveTarget::Flight).is_none());
        let node = encode_record(&record, "hab", SaveTarget::Craft).unwrap();
        assert_eq!(node.get_value(VALUE_SHIP_ID), Some("3"));
        assert!(!node.has_value(VALUE_FLIGHT_ID));
    }

    #[test]
    fn test_decode_restores_id_enabled_and_fields() {
        let mut record = habitat(perm(42), 7.5);
        record.set_enabled(false);
        let node = encode_record(&record, "hab", SaveTarget::Flight).unwrap();

        let decoded = decode_record(&node, &registry(), PartId(1), None).unwrap();
        assert_eq!(decoded.id(), perm(42));
        assert!(!decoded.is_enabled());
        assert_eq!(decoded.downcast_ref::<HabitatData>().unwrap().volume, 7.5);
    }

    #[test]
    fn test_missing_id_is_corrupt() {
        let node = ConfigNode::new("hab@HabitatData#5").with_value(VALUE_ENABLED, true);
        assert_eq!(
            decode_id(&node),
            Err(RecordError::Corrupt {
                node: "hab@HabitatData#5".into(),
                reason: "missing id"
            })
        );
        let zero = ConfigNode::new("hab@HabitatData#0").with_value(VALUE_FLIGHT_ID, 0);
        assert!(decode_id(&zero).is_err());
    }

    #[test]
    fn test_unknown_data_kind_rejected() {
        let node = ConfigNode::new("hab@GhostData#5").with_value(VALUE_FLIGHT_ID, 5);
        let err = decode_record(&node, &registry(), PartId(1), None).unwrap_err();
        assert!(matches!(err, RecordError::Registry(_)));
    }

    #[test]
    fn test_node_index_discards_corrupt_and_duplicates() {
        let modules = ConfigNode::new(NODE_MODULES)
            .with_node(ConfigNode::new("a@HabitatData#1").with_value(VALUE_FLIGHT_ID, 1))
            .with_node(ConfigNode::new("b@HabitatData#1").with_value(VALUE_FLIGHT_ID, 1))
            .with_node(ConfigNode::new("c@HabitatData#2"));
        let mut index = NodeIndex::build(&modules);
        assert_eq!(index.len(), 1);
        assert_eq!(index.take(perm(1)).unwrap().name, "a@HabitatData#1");
        assert!(index.is_empty());
    }

    #[test]
    fn test_save_modules_walks_parts_in_order() {
        let mut arena = ModuleArena::new();
        let mut parts = PartCollection::new(CollectionScope::Ship);
        let prefab = PartPrefab::new("hab").into_shared();
        for raw in [5, 4] {
            let id = prov(raw);
            arena.insert(habitat(id, 1.0)).unwrap();
            parts.get_or_insert(PartId(raw), &prefab).push_module(id);
        }
        parts.insert(PartRecord::new(PartId(9), prefab.clone()));

        let node = save_modules(&parts, &arena, SaveTarget::Craft);
        let names: Vec<_> = node.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["hab@HabitatData#5", "hab@HabitatData#4"]);
    }
}
