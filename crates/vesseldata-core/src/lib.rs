//! Vessel module data runtime.
//!
//! Every component instance on every part of a vessel has a persisted data
//! record. This crate creates those records, keeps their ids unique, links
//! them to live component objects while parts are loaded, carries them
//! through editor → launch → flight → docking/undocking, and saves and loads
//! them.
//!
//! # Architecture
//!
//! Records live in a single arena owned by the [`Database`](database::Database),
//! keyed by id. Parts and vessels hold ids only; cross-record relations are
//! ids resolved through the database on demand. Loaded scenes are a
//! `hecs::World`, and the live link of a record is a weak `hecs::Entity`.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`codec`] | Records to and from persisted nodes |
//! | [`config`] | Database configuration |
//! | [`database`] | Record ownership and every lifecycle protocol |
//! | [`error`] | Error types |
//! | [`host`] | Host object model: prefabs, loaded parts, live modules, snapshots |
//! | [`ids`] | Permanent and provisional ids, id allocation |
//! | [`kinds`] | Built-in data kinds |
//! | [`node`] | Tree-structured persisted node |
//! | [`persistence`] | Flight save and craft files |
//! | [`records`] | Module records, part records, collections, aggregates |
//! | [`registry`] | Component kind → data kind → factory |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vesseldata_core::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::scan());
//! let mut db = Database::new(registry, DatabaseConfig::default());
//! let mut scene = hecs::World::new();
//!
//! let pod = PartPrefab::new("pod")
//!     .with_module("ModuleHabitat", ConfigNode::new("MODULE").with_value("volume", 4.0))
//!     .into_shared();
//!
//! db.begin_ship_session("Explorer");
//! let part = spawn_part(&mut scene, PartId(1), None, pod);
//! db.ship_part_added(&mut scene, part).unwrap();
//! db.launch(&mut scene, VesselId(1), "Explorer").unwrap();
//! db.tick(1.0);
//! ```

pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod host;
pub mod ids;
pub mod kinds;
pub mod node;
pub mod persistence;
pub mod records;
pub mod registry;

#[doc(hidden)]
pub use inventory;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::config::DatabaseConfig;
    pub use crate::database::{Database, LoadReport, RecoveryOutcome};
    pub use crate::error::*;
    pub use crate::host::{
        live_modules, spawn_part, LiveModule, LoadedPart, ModulePrefab, PartId, PartPrefab,
        ProtoModule, ProtoPart, ProtoVessel, VesselId,
    };
    pub use crate::ids::{ModuleId, PermanentId, ProvisionalId};
    pub use crate::kinds::*;
    pub use crate::node::ConfigNode;
    pub use crate::records::{
        CollectionScope, HookContext, ModuleData, ModuleRecord, RecordState, VesselAggregate,
    };
    pub use crate::registry::{DataKind, ModuleKind, TypeRegistry};
}
