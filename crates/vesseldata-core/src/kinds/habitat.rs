use std::fmt;
use std::str::FromStr;

use crate::error::DataError;
use crate::node::ConfigNode;
use crate::records::{HookContext, ModuleData, VesselAggregate};
use crate::registry::DataKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressureState {
    Pressurized,
    Depressurized,
    #[default]
    AlwaysDepressurized,
}

impl fmt::Display for PressureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PressureState::Pressurized => "Pressurized",
            PressureState::Depressurized => "Depressurized",
            PressureState::AlwaysDepressurized => "AlwaysDepressurized",
        };
        f.write_str(name)
    }
}

impl FromStr for PressureState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pressurized" => Ok(PressureState::Pressurized),
            "Depressurized" => Ok(PressureState::Depressurized),
            "AlwaysDepressurized" => Ok(PressureState::AlwaysDepressurized),
            _ => Err(()),
        }
    }
}

/// Habitable volume on a part
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HabitatData {
    /// m3
    pub volume: f64,
    /// m2
    pub surface: f64,
    /// Whether the habitat counts toward the vessel's living space
    pub habitat_enabled: bool,
    pub pressure: PressureState,
    pub crew_count: u32,
}

impl HabitatData {
    pub fn is_pressurized(&self) -> bool {
        self.pressure == PressureState::Pressurized
    }
}

impl DataKind for HabitatData {
    const COMPONENT_KIND: &'static str = "ModuleHabitat";
    const DATA_KIND: &'static str = "HabitatData";
}

impl ModuleData for HabitatData {
    fn on_first_instantiate(&mut self, ctx: &HookContext<'_>) {
        let Some(prefab) = ctx.prefab else {
            return;
        };
        let config = &prefab.config;
        let deployable = config.value_or("deployable", false);
        let can_pressurize = config.value_or("canPressurize", true);

        self.volume = config.value_or("volume", 0.0);
        self.surface = config.value_or("surface", 0.0);
        self.habitat_enabled = !deployable;
        self.pressure = match (can_pressurize, self.habitat_enabled) {
            (false, _) => PressureState::AlwaysDepressurized,
            (true, true) => PressureState::Pressurized,
            (true, false) => PressureState::Depressurized,
        };
    }

    fn on_load(&mut self, node: &ConfigNode, _ctx: &HookContext<'_>) -> Result<(), DataError> {
        self.volume = node.value_or("baseVolume", self.volume);
        self.surface = node.value_or("baseSurface", self.surface);
        self.habitat_enabled = node.value_or("habitatEnabled", self.habitat_enabled);
        self.pressure = node.value_or("pressureState", self.pressure);
        self.crew_count = node.value_or("crewCount", self.crew_count);
        Ok(())
    }

    fn on_save(&self, node: &mut ConfigNode) {
        node.add_value("baseVolume", self.volume);
        node.add_value("baseSurface", self.surface);
        node.add_value("habitatEnabled", self.habitat_enabled);
        node.add_value("pressureState", self.pressure);
        node.add_value("crewCount", self.crew_count);
    }

    fn on_vessel_update(&self, aggregate: &mut VesselAggregate) {
        if !self.habitat_enabled {
            return;
        }
        aggregate.add("habitat.volume", self.volume);
        aggregate.add("habitat.surface", self.surface);
        aggregate.add("habitat.crew", f64::from(self.crew_count));
        if self.is_pressurized() {
            aggregate.add("habitat.pressurized_volume", self.volume);
        }
    }
}
