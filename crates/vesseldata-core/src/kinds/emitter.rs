use std::collections::BTreeMap;

use crate::error::DataError;
use crate::ids::PermanentId;
use crate::node::ConfigNode;
use crate::records::{HookContext, ModuleData, VesselAggregate};
use crate::registry::DataKind;

const NODE_HABITATS: &str = "HABITATS";

/// A radiation source and its distance-scaled effect on each habitat.
///
/// Habitats are referenced by the permanent id of their [`HabitatData`]
/// record, never by reference. Entries whose habitat no longer resolves are
/// dropped with [`prune`](Self::prune).
///
/// [`HabitatData`]: crate::kinds::HabitatData
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadiationEmitterData {
    pub running: bool,
    habitats: BTreeMap<PermanentId, f64>,
}

impl RadiationEmitterData {
    pub fn set_habitat_radiation(&mut self, habitat: PermanentId, radiation: f64) {
        self.habitats.insert(habitat, radiation);
    }

    /// Scaled radiation for a habitat, `0.0` if unknown
    pub fn habitat_radiation(&self, habitat: PermanentId) -> f64 {
        self.habitats.get(&habitat).copied().unwrap_or(0.0)
    }

    pub fn habitats(&self) -> impl Iterator<Item = (PermanentId, f64)> + '_ {
        self.habitats.iter().map(|(id, rad)| (*id, *rad))
    }

    /// Drop entries for habitats `exists` rejects. Returns how many went.
    pub fn prune(&mut self, exists: impl Fn(PermanentId) -> bool) -> usize {
        let before = self.habitats.len();
        self.habitats.retain(|id, _| exists(*id));
        before - self.habitats.len()
    }
}

impl DataKind for RadiationEmitterData {
    const COMPONENT_KIND: &'static str = "ModuleRadiationEmitter";
    const DATA_KIND: &'static str = "RadiationEmitterData";
}

impl ModuleData for RadiationEmitterData {
    fn on_first_instantiate(&mut self, ctx: &HookContext<'_>) {
        self.running = ctx
            .prefab
            .map_or(true, |prefab| prefab.config.value_or("running", true));
    }

    fn on_load(&mut self, node: &ConfigNode, _ctx: &HookContext<'_>) -> Result<(), DataError> {
        self.running = node.value_or("running", true);
        self.habitats.clear();
        let Some(habitats) = node.get_node(NODE_HABITATS) else {
            return Ok(());
        };
        for (key, value) in habitats.values() {
            let id = key.parse().ok().and_then(PermanentId::new);
            match (id, value.parse::<f64>()) {
                (Some(id), Ok(radiation)) => {
                    self.habitats.insert(id, radiation);
                }
                _ => log::warn!("ignoring malformed habitat entry `{} = {}`", key, value),
            }
        }
        Ok(())
    }

    fn on_save(&self, node: &mut ConfigNode) {
        node.add_value("running", self.running);
        let habitats = node.add_node(ConfigNode::new(NODE_HABITATS));
        for (id, radiation) in &self.habitats {
            habitats.add_value(id.to_string(), radiation);
        }
    }

    fn on_vessel_update(&self, aggregate: &mut VesselAggregate) {
        if self.running {
            aggregate.add("radiation.emitted", self.habitats.values().sum::<f64>());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PartId;
    use crate::ids::ModuleId;

    fn id(raw: u32) -> PermanentId {
        PermanentId::new(raw).unwrap()
    }

    fn ctx() -> HookContext<'static> {
        HookContext {
            id: ModuleId::Permanent(id(1)),
            part: PartId(1),
            live: None,
            prefab: None,
            proto: None,
        }
    }

    #[test]
    fn test_habitats_survive_save_and_load() {
        let mut data = RadiationEmitterData {
            running: true,
            ..Default::default()
        };
        data.set_habitat_radiation(id(40), 0.25);
        data.set_habitat_radiation(id(41), 1.5);

        let mut node = ConfigNode::new("MODULE");
        data.on_save(&mut node);

        let mut loaded = RadiationEmitterData::default();
        loaded.on_load(&node, &ctx()).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_malformed_habitat_entries_skipped() {
        let node = ConfigNode::new("MODULE").with_node(
            ConfigNode::new(NODE_HABITATS)
                .with_value("0", 1.0)
                .with_value("abc", 1.0)
                .with_value("7", 2.0),
        );
        let mut data = RadiationEmitterData::default();
        data.on_load(&node, &ctx()).unwrap();
        assert_eq!(data.habitats().collect::<Vec<_>>(), vec![(id(7), 2.0)]);
    }

    #[test]
    fn test_prune_drops_unresolved_habitats() {
        let mut data = RadiationEmitterData::default();
        data.set_habitat_radiation(id(1), 1.0);
        data.set_habitat_radiation(id(2), 1.0);
        assert_eq!(data.prune(|h| h == id(2)), 1);
        assert_eq!(data.habitat_radiation(id(1)), 0.0);
        assert_eq!(data.habitat_radiation(id(2)), 1.0);
    }
}
