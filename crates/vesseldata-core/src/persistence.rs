//! Save/Load of module data to files
//!
//! Flight saves use bincode for compact binary serialization of every
//! vessel's module node. Craft files are pretty-printed JSON so they can be
//! shared and diffed.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::SaveError;
use crate::host::VesselId;
use crate::node::ConfigNode;

/// Version number for save file format (increment when format changes)
const SAVE_VERSION: u32 = 1;

/// One vessel's persisted module data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedVessel {
    pub vessel_id: VesselId,
    pub name: String,
    pub node: ConfigNode,
}

/// Serializable snapshot of every flight vessel
#[derive(Serialize, Deserialize)]
struct FlightSave {
    version: u32,
    vessels: Vec<SavedVessel>,
}

/// Write a flight save
pub fn write_flight<W: Write>(writer: W, vessels: &[SavedVessel]) -> Result<(), SaveError> {
    let save = FlightSave {
        version: SAVE_VERSION,
        vessels: vessels.to_vec(),
    };
    bincode::serialize_into(writer, &save)?;
    Ok(())
}

/// Read a flight save written by [`write_flight`]
pub fn read_flight<R: Read>(reader: R) -> Result<Vec<SavedVessel>, SaveError> {
    let save: FlightSave = bincode::deserialize_from(reader)?;

    if save.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: save.version,
        });
    }

    Ok(save.vessels)
}

pub fn write_craft<W: Write>(writer: W, craft: &ConfigNode) -> Result<(), SaveError> {
    serde_json::to_writer_pretty(writer, craft)?;
    Ok(())
}

pub fn read_craft<R: Read>(reader: R) -> Result<ConfigNode, SaveError> {
    Ok(serde_json::from_reader(reader)?)
}
