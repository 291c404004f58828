//! Hardware driver lookup.
//!
//! `[hardware] driver = "..."` names the board support to use; the registry
//! maps that name to a factory. `pops_control` builds one at startup with
//! [`DriverRegistry::with_builtin_drivers`].

use pops_common::hal::driver::{DriverFactory, HalError, HardwareDriver};
use std::collections::HashMap;

/// Driver factories keyed by configuration name.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `beaglebone` and `simulation`.
    ///
    /// # Errors
    /// Propagates [`crate::drivers::register_all_drivers`] failures.
    pub fn with_builtin_drivers() -> Result<Self, HalError> {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry)?;
        Ok(registry)
    }

    /// Add a factory under `name`.
    ///
    /// # Errors
    /// `HalError::DuplicateDriver` if `name` is taken; the existing factory is kept.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) -> Result<(), HalError> {
        if self.factories.contains_key(name) {
            return Err(HalError::DuplicateDriver(name.to_string()));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Build the driver configured as `name`.
    ///
    /// # Errors
    /// `HalError::DriverNotFound` for an unknown name.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn HardwareDriver>, HalError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pops_common::config::{HardwareConfig, TimingConfig};
    use pops_common::consts::AI_CHANNELS;

    struct TestDriver;

    impl HardwareDriver for TestDriver {
        fn name(&self) -> &'static str {
            "test"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn init(&mut self, _: &HardwareConfig, _: &TimingConfig) -> Result<(), HalError> {
            Ok(())
        }

        fn read_analog_inputs(&mut self, _: &mut [i32; AI_CHANNELS]) -> Result<(), HalError> {
            Ok(())
        }

        fn read_pressure_temperature(&mut self) -> Result<(f64, f64), HalError> {
            Ok((1013.25, 20.0))
        }

        fn set_analog_output(&mut self, _: usize, _: u32) -> Result<(), HalError> {
            Ok(())
        }

        fn set_heartbeat(&mut self, _: bool) -> Result<(), HalError> {
            Ok(())
        }

        fn set_range_alarm(&mut self, _: bool) -> Result<(), HalError> {
            Ok(())
        }

        fn pet_watchdog(&mut self) -> Result<(), HalError> {
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), HalError> {
            Ok(())
        }
    }

    fn create_test_driver() -> Box<dyn HardwareDriver> {
        Box::new(TestDriver)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("test_driver", create_test_driver).unwrap();

        let driver = reg.create_driver("test_driver").expect("should create");
        assert_eq!(driver.name(), "test");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create_driver("nonexistent");
        assert!(matches!(result, Err(HalError::DriverNotFound(_))));
    }

    #[test]
    fn builtin_drivers_are_registered() {
        let reg = DriverRegistry::with_builtin_drivers().unwrap();
        assert_eq!(reg.list_drivers(), ["beaglebone", "simulation"]);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", create_test_driver).unwrap();
        assert!(matches!(
            reg.register("dup", create_test_driver),
            Err(HalError::DuplicateDriver(name)) if name == "dup"
        ));
        assert_eq!(reg.list_drivers(), ["dup"]);

        let mut builtin = DriverRegistry::with_builtin_drivers().unwrap();
        assert!(crate::drivers::register_all_drivers(&mut builtin).is_err());
        assert!(builtin.create_driver("simulation").is_ok());
    }
}
