//! Error types for every protocol of the runtime.
//!
//! Registry, record and id errors are recovered inside protocol loops (logged
//! and skipped). Launch and transfer errors abort the whole operation and are
//! returned to the host.

use thiserror::Error;

use crate::host::{PartId, VesselId};
use crate::ids::{ModuleId, ProvisionalId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown component kind `{0}`")]
    UnknownComponentKind(String),
    #[error("unknown data kind `{0}`")]
    UnknownDataKind(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier space exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("provisional id {0} was already promoted")]
    AlreadyPromoted(ProvisionalId),
    #[error("provisional id {0} does not belong to the current session")]
    NotInSession(ProvisionalId),
}

/// A persisted module node that could not become a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("corrupt record node `{node}`: {reason}")]
    Corrupt { node: String, reason: &'static str },
    #[error("identifier {0} is already in use")]
    DuplicateIdentifier(ModuleId),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Returned by data hooks when persisted state can't be resolved.
/// The record is kept but disabled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("missing value `{0}`")]
    MissingValue(&'static str),
    #[error("`{key}` refers to `{value}`, which no longer exists")]
    Unresolved { key: &'static str, value: String },
    #[error("no template for this module on its part")]
    MissingTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("no ship is being edited")]
    NoShipSession,
    #[error("vessel {0} already exists")]
    VesselExists(VesselId),
    #[error("part {part} is already in flight on vessel {vessel}")]
    PartInFlight { part: PartId, vessel: VesselId },
    #[error("promotion failed at record {failed_at} of {total}: {source}")]
    PartialPromotion {
        failed_at: usize,
        total: usize,
        #[source]
        source: IdError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("unknown vessel {0}")]
    UnknownVessel(VesselId),
    #[error("vessel {0} already exists")]
    VesselExists(VesselId),
    #[error("vessel {0} can't transfer parts to itself")]
    SameVessel(VesselId),
    #[error("part {part} is not on vessel {vessel}")]
    PartNotInVessel { part: PartId, vessel: VesselId },
    #[error("part {part} is already on vessel {vessel}")]
    PartCollision { part: PartId, vessel: VesselId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("no ship is being edited")]
    NoShipSession,
    #[error("unknown vessel {0}")]
    UnknownVessel(VesselId),
    #[error("vessel {0} already exists")]
    VesselExists(VesselId),
    #[error("entity {0:?} is not a live module")]
    NotALiveModule(hecs::Entity),
    #[error("entity {0:?} is not a loaded part")]
    NotALoadedPart(hecs::Entity),
    #[error("part {0} does not belong to a flight vessel")]
    PartNotInFlight(PartId),
    #[error(transparent)]
    Id(#[from] IdError),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("Craft file error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// A broken global-index invariant, reported by `Database::check_consistency`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("index inconsistency: {0}")]
pub struct ConsistencyError(pub String);
