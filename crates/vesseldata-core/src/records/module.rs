//! Module data records and the hooks data kinds implement.

use hecs::Entity;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::aggregate::VesselAggregate;
use crate::error::DataError;
use crate::host::{ModulePrefab, PartId, ProtoModule};
use crate::ids::ModuleId;
use crate::node::ConfigNode;
use crate::registry::ModuleKind;

/// Downcasting support for [`ModuleData`] trait objects
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a hook sees of the record it runs on
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub id: ModuleId,
    pub part: PartId,
    /// Live component object, absent while the part is unloaded
    pub live: Option<Entity>,
    /// Static configuration of this module slot
    pub prefab: Option<&'a ModulePrefab>,
    /// Snapshot of the module, when instantiated for an unloaded part
    pub proto: Option<&'a ProtoModule>,
}

/// Persisted state of one component kind.
///
/// Implementors only hold their own fields. Identity, enablement and the live
/// link are kept on the surrounding [`ModuleRecord`]. Hooks never see other
/// records; relations to other records are stored as ids and resolved
/// through the database.
pub trait ModuleData: AsAny + fmt::Debug {
    /// New record with no prior state
    fn on_first_instantiate(&mut self, _ctx: &HookContext<'_>) {}

    /// Restore type-specific fields. An error disables the record.
    fn on_load(&mut self, _node: &ConfigNode, _ctx: &HookContext<'_>) -> Result<(), DataError> {
        Ok(())
    }

    fn on_save(&self, _node: &mut ConfigNode) {}

    /// Called once, after instantiation or load
    fn on_start(&mut self, _ctx: &HookContext<'_>) {}

    /// Per-tick update, for started records
    fn on_update(&mut self, _elapsed_seconds: f64) {}

    /// Contribute to the derived state of the owning vessel
    fn on_vessel_update(&self, _aggregate: &mut VesselAggregate) {}

    fn on_will_destroy(&mut self) {}
}

/// Lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    Instantiated,
    /// Live object appeared without a matching record; being recreated
    AwaitingRelink,
    Started,
    /// Initialized, but the part is unloaded
    Suspended,
    Destroyed,
}

/// One component instance on one part
pub struct ModuleRecord {
    id: ModuleId,
    kind: ModuleKind,
    part: PartId,
    enabled: bool,
    state: RecordState,
    live: Option<Entity>,
    prefab: Option<Arc<ModulePrefab>>,
    data: Box<dyn ModuleData>,
}

impl ModuleRecord {
    pub(crate) fn new(
        kind: ModuleKind,
        id: ModuleId,
        part: PartId,
        prefab: Option<Arc<ModulePrefab>>,
    ) -> Self {
        Self {
            id,
            kind,
            part,
            enabled: true,
            state: RecordState::Instantiated,
            live: None,
            prefab,
            data: kind.instantiate(),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn data_kind(&self) -> &'static str {
        self.kind.data_kind
    }

    pub fn part(&self) -> PartId {
        self.part
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Live component object, if the part is loaded and linked
    pub fn live(&self) -> Option<Entity> {
        self.live
    }

    pub fn prefab(&self) -> Option<&ModulePrefab> {
        self.prefab.as_deref()
    }

    pub fn data(&self) -> &dyn ModuleData {
        self.data.as_ref()
    }

    pub fn data_mut(&mut self) -> &mut dyn ModuleData {
        self.data.as_mut()
    }

    pub fn is<T: ModuleData>(&self) -> bool {
        self.data().as_any().is::<T>()
    }

    pub fn downcast_ref<T: ModuleData>(&self) -> Option<&T> {
        self.data().as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: ModuleData>(&mut self) -> Option<&mut T> {
        self.data_mut().as_any_mut().downcast_mut::<T>()
    }

    pub(crate) fn set_id(&mut self, id: ModuleId) {
        self.id = id;
    }

    pub(crate) fn set_state(&mut self, state: RecordState) {
        self.state = state;
    }

    pub(crate) fn first_instantiate(&mut self, proto: Option<&ProtoModule>) {
        let ctx = HookContext {
            id: self.id,
            part: self.part,
            live: self.live,
            prefab: self.prefab.as_deref(),
            proto,
        };
        self.data.on_first_instantiate(&ctx);
    }

    /// Run `on_load`, disabling the record if it can't resolve its state
    pub(crate) fn load(&mut self, node: &ConfigNode) {
        let ctx = HookContext {
            id: self.id,
            part: self.part,
            live: self.live,
            prefab: self.prefab.as_deref(),
            proto: None,
        };
        if let Err(e) = self.data.on_load(node, &ctx) {
            log::warn!(
                "{} {} on part {} failed to load ({}), disabling it",
                self.kind.data_kind,
                self.id,
                self.part,
                e
            );
            self.enabled = false;
        }
    }

    /// Run `on_start` and enter `Started` or `Suspended` depending on the
    /// live link
    pub(crate) fn start(&mut self, live: Option<Entity>) {
        self.live = live;
        let ctx = HookContext {
            id: self.id,
            part: self.part,
            live: self.live,
            prefab: self.prefab.as_deref(),
            proto: None,
        };
        self.data.on_start(&ctx);
        self.state = if self.live.is_some() {
            RecordState::Started
        } else {
            RecordState::Suspended
        };
    }

    /// Attach a live object. Does not rerun any initialization hook.
    pub(crate) fn link(&mut self, live: Entity) {
        self.live = Some(live);
        if matches!(
            self.state,
            RecordState::Suspended | RecordState::AwaitingRelink
        ) {
            self.state = RecordState::Started;
        }
    }

    pub(crate) fn suspend(&mut self) {
        self.live = None;
        if self.state == RecordState::Started {
            self.state = RecordState::Suspended;
        }
    }

    pub(crate) fn update(&mut self, elapsed_seconds: f64) {
        self.data.on_update(elapsed_seconds);
    }

    /// Final hook call. The record must be dropped afterwards.
    pub(crate) fn destroy(&mut self) {
        if self.state == RecordState::Destroyed {
            return;
        }
        self.data.on_will_destroy();
        self.live = None;
        self.state = RecordState::Destroyed;
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("data_kind", &self.kind.data_kind)
            .field("part", &self.part)
            .field("enabled", &self.enabled)
            .field("state", &self.state)
            .field("live", &self.live)
            .field("data", &self.data)
            .finish()
    }
}
