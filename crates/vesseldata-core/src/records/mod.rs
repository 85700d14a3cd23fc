//! Record definitions: module data records, part records and collections.
//!
//! Records are owned by the [`ModuleArena`]; parts and collections only hold
//! identifiers and resolve them through the arena on demand.

mod aggregate;
mod arena;
mod module;
mod part;

pub use aggregate::*;
pub use arena::*;
pub use module::*;
pub use part::*;
