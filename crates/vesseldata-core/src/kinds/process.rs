use crate::error::DataError;
use crate::node::ConfigNode;
use crate::records::{HookContext, ModuleData, VesselAggregate};
use crate::registry::DataKind;

/// State of a process controller: which process it runs and at what capacity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessControllerData {
    pub process_name: String,
    pub capacity: f64,
    pub running: bool,
    pub broken: bool,
    /// Accumulated time spent running, in seconds
    pub running_seconds: f64,
}

impl ProcessControllerData {
    /// Aggregate key this controller contributes its capacity to
    pub fn aggregate_key(process_name: &str) -> String {
        format!("process.{}", process_name)
    }

    pub fn setup(&mut self, process_name: impl Into<String>, capacity: f64) {
        self.process_name = process_name.into();
        self.capacity = capacity;
    }
}

impl DataKind for ProcessControllerData {
    const COMPONENT_KIND: &'static str = "ModuleProcessController";
    const DATA_KIND: &'static str = "ProcessControllerData";
}

impl ModuleData for ProcessControllerData {
    fn on_first_instantiate(&mut self, ctx: &HookContext<'_>) {
        let Some(prefab) = ctx.prefab else {
            return;
        };
        let config = &prefab.config;
        self.process_name = config.get_value("processName").unwrap_or_default().to_string();
        self.capacity = config.value_or("capacity", 0.0);
        self.running = config.value_or("running", true);
        self.broken = config.value_or("broken", false);
    }

    fn on_load(&mut self, node: &ConfigNode, ctx: &HookContext<'_>) -> Result<(), DataError> {
        self.process_name = node.get_value("processName").unwrap_or_default().to_string();
        self.capacity = node.value_or("processCapacity", 0.0);
        self.running = node.value_or("isRunning", true);
        self.broken = node.value_or("isBroken", false);
        self.running_seconds = node.value_or("runningSeconds", 0.0);

        if self.process_name.is_empty() {
            return Err(DataError::MissingValue("processName"));
        }
        // the part template may have been reconfigured since the save
        if let Some(prefab) = ctx.prefab {
            if prefab.config.get_value("processName") != Some(self.process_name.as_str()) {
                return Err(DataError::Unresolved {
                    key: "processName",
                    value: self.process_name.clone(),
                });
            }
        }
        Ok(())
    }

    fn on_save(&self, node: &mut ConfigNode) {
        node.add_value("processName", &self.process_name);
        node.add_value("processCapacity", self.capacity);
        node.add_value("isRunning", self.running);
        node.add_value("isBroken", self.broken);
        node.add_value("runningSeconds", self.running_seconds);
    }

    fn on_update(&mut self, elapsed_seconds: f64) {
        if self.running && !self.broken {
            self.running_seconds += elapsed_seconds;
        }
    }

    fn on_vessel_update(&self, aggregate: &mut VesselAggregate) {
        if self.broken {
            return;
        }
        let capacity = if self.running { self.capacity } else { 0.0 };
        aggregate.add(Self::aggregate_key(&self.process_name), capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ModulePrefab, PartId};
    use crate::ids::{ModuleId, PermanentId};

    fn prefab(process: &str) -> ModulePrefab {
        ModulePrefab {
            component_kind: ProcessControllerData::COMPONENT_KIND.to_string(),
            config: ConfigNode::new("MODULE")
                .with_value("processName", process)
                .with_value("capacity", 2.5)
                .with_value("running", false),
        }
    }

    fn ctx(prefab: Option<&ModulePrefab>) -> HookContext<'_> {
        HookContext {
            id: ModuleId::Permanent(PermanentId::new(1).unwrap()),
            part: PartId(1),
            live: None,
            prefab,
            proto: None,
        }
    }

    #[test]
    fn test_first_instantiate_reads_template() {
        let prefab = prefab("scrubber");
        let mut data = ProcessControllerData::default();
        data.on_first_instantiate(&ctx(Some(&prefab)));
        assert_eq!(data.process_name, "scrubber");
        assert_eq!(data.capacity, 2.5);
        assert!(!data.running);
        assert!(!data.broken);
    }

    #[test]
    fn test_load_fails_when_template_process_changed() {
        let prefab = prefab("sabatier");
        let node = ConfigNode::new("n")
            .with_value("processName", "scrubber")
            .with_value("processCapacity", 1.0);
        let mut data = ProcessControllerData::default();
        let err = data.on_load(&node, &ctx(Some(&prefab))).unwrap_err();
        assert_eq!(
            err,
            DataError::Unresolved {
                key: "processName",
                value: "scrubber".into()
            }
        );
        // fields are still restored so the slot round-trips
        assert_eq!(data.capacity, 1.0);
    }

    #[test]
    fn test_load_requires_process_name() {
        let mut data = ProcessControllerData::default();
        assert_eq!(
            data.on_load(&ConfigNode::new("n"), &ctx(None)),
            Err(DataError::MissingValue("processName"))
        );
    }

    #[test]
    fn test_update_only_while_running() {
        let mut data = ProcessControllerData {
            running: true,
            ..Default::default()
        };
        data.on_update(3.0);
        data.broken = true;
        data.on_update(5.0);
        assert_eq!(data.running_seconds, 3.0);
    }

    #[test]
    fn test_vessel_update_reports_capacity() {
        let mut data = ProcessControllerData::default();
        data.setup("scrubber", 4.0);
        data.running = true;
        let mut agg = VesselAggregate::new();
        data.on_vessel_update(&mut agg);
        data.running = false;
        data.on_vessel_update(&mut agg);
        assert_eq!(agg.get("process.scrubber"), 4.0);
    }
}
