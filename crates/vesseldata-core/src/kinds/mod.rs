//! Built-in data kinds.
//!
//! | Component kind            | Data kind               |
//! |---------------------------|-------------------------|
//! | `ModuleProcessController` | `ProcessControllerData` |
//! | `ModuleHabitat`           | `HabitatData`           |
//! | `ModuleRadiationEmitter`  | `RadiationEmitterData`  |

mod emitter;
mod habitat;
mod process;

pub use emitter::RadiationEmitterData;
pub use habitat::{HabitatData, PressureState};
pub use process::ProcessControllerData;

crate::register_module_kind!(ProcessControllerData);
crate::register_module_kind!(HabitatData);
crate::register_module_kind!(RadiationEmitterData);
