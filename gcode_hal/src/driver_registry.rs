//! Registry of named simulation-machine factories.
//!
//! A constructor-injection registry (register by name, panic on
//! duplicate registration, list/create by name). The registered product
//! is a concrete [`crate::sim::SimulatedMachine`] rather than a
//! `Box<dyn HalDriver>` trait object — this workspace has exactly one
//! backend (simulation), and the machine bundles every collaborator
//! trait on one struct so `gcode_core` can borrow it as whichever trait
//! it currently needs.

use gcode_common::consts::N_AXIS;
use gcode_common::hal::HalError;
use std::collections::HashMap;

use crate::sim::SimulatedMachine;

type MachineFactory = fn() -> SimulatedMachine;

/// Registry of available simulated-machine configurations.
pub struct DriverRegistry {
    factories: HashMap<&'static str, MachineFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// # Panics
    /// Panics if a machine with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: MachineFactory) {
        if self.factories.contains_key(name) {
            panic!("machine configuration '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<MachineFactory> {
        self.factories.get(name).copied()
    }

    pub fn create_machine(&self, name: &str) -> Result<SimulatedMachine, HalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    pub fn list_machines(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut reg = Self::new();
        reg.register("default", default_machine);
        reg
    }
}

fn default_machine() -> SimulatedMachine {
    SimulatedMachine::new([250.0; N_AXIS])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_machine() -> SimulatedMachine {
        SimulatedMachine::new([100.0; N_AXIS])
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("test_machine", test_machine);
        let machine = reg.create_machine("test_machine").expect("should create");
        assert_eq!(machine.steps_per_mm[0], 100.0);
    }

    #[test]
    fn registry_machine_not_found() {
        let reg = DriverRegistry::new();
        assert!(matches!(
            reg.create_machine("nonexistent"),
            Err(HalError::DriverNotFound(_))
        ));
    }

    #[test]
    fn registry_list_machines() {
        let mut reg = DriverRegistry::new();
        reg.register("alpha", test_machine);
        reg.register("beta", test_machine);
        let mut names = reg.list_machines();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", test_machine);
        reg.register("dup", test_machine);
    }

    #[test]
    fn default_registry_has_a_default_machine() {
        let reg = DriverRegistry::default();
        assert!(reg.create_machine("default").is_ok());
    }
}
