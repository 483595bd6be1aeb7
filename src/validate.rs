// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware rule checks of a configuration against the pin mapping catalog.
//! Nothing here stops at the first problem: every violation is collected.

use std::collections::BTreeMap;

use crate::config::gpio::GpioPinTable;
use crate::config::pins::pin_assignments;
use crate::config::DeviceConfig;
use crate::device::strip_device_prefix;
use crate::pinmap::{Catalog, DeviceMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No device selected, cannot validate pin assignments")]
    NoDevice,
    #[error("Device '{0}' not found in pin mappings")]
    UnknownDevice(String),
    #[error("Pin {pin}: Error parsing configuration - {reason}")]
    BadPinEntry { pin: u32, reason: String },
    #[error("Pin {pin}: Function '{function}' not available. Available functions: {}", .available.join(", "))]
    FunctionNotAvailable { pin: u32, function: String, available: Vec<String> },
    #[error("Pin {pin}: Cannot change function on read-only pin. Must be '{required}'")]
    ReadOnlyPin { pin: u32, required: String },
    #[error("Pin {pin}: not present on the {package} package")]
    PinNotInPackage { pin: u32, package: String },
    #[error("Function name '{name}' is used by more than one pin: {}", join_pins(.pins))]
    DuplicateFunction { name: String, pins: Vec<u32> },
    #[error("Config bit {bit}: value '{value}' is not one of {}", .options.join(", "))]
    UnknownBitValue { bit: String, value: String, options: Vec<String> },
}

fn join_pins(pins: &[u32]) -> String {
    pins.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
}

/// Looks up the pin map for the configured device, or the single error that
/// prevents any per-pin check.
pub fn resolve_device<'a>(config: &DeviceConfig, catalog: &'a Catalog) -> Result<DeviceMap<'a>, ValidationError> {
    if config.device_name().trim().is_empty() {
        return Err(ValidationError::NoDevice);
    }
    let device = strip_device_prefix(config.device_name().trim());
    catalog.select(device).ok_or_else(|| ValidationError::UnknownDevice(device.to_string()))
}

/// Checks the pin assignments against what each pin supports. An empty
/// result means the configuration is valid.
pub fn validate(config: &DeviceConfig, catalog: &Catalog) -> Vec<ValidationError> {
    let map = match resolve_device(config, catalog) {
        Ok(map) => map,
        Err(e) => return vec![e],
    };

    let mut errors = vec![];

    for (pin, assignment) in pin_assignments(config) {
        let assignment = match assignment {
            Ok(a) => a,
            Err(e) => {
                errors.push(ValidationError::BadPinEntry { pin, reason: e.to_string() });
                continue;
            }
        };

        let mapping = match map.pin(pin) {
            Some(m) => m,
            None => continue,
        };

        // A read-only pin can only hold its default, that is the one rule reported for it
        let selected = assignment.selected_function.as_deref().unwrap_or("");
        if mapping.is_read_only {
            if selected != mapping.default_function {
                errors.push(ValidationError::ReadOnlyPin {
                    pin,
                    required: mapping.default_function.clone(),
                });
            }
        } else if !selected.is_empty() && !mapping.allows(selected) {
            errors.push(ValidationError::FunctionNotAvailable {
                pin,
                function: selected.to_string(),
                available: mapping.available_functions.clone(),
            });
        }
    }

    for e in &errors {
        debug!("{}", e);
    }
    errors
}

/// Checks the GPIO pin table: pins outside the package, function changes on
/// read-only pins, and function names claimed by more than one pin.
pub fn validate_gpio(config: &DeviceConfig, catalog: &Catalog) -> Vec<ValidationError> {
    let map = match resolve_device(config, catalog) {
        Ok(map) => map,
        Err(e) => return vec![e],
    };

    let table = GpioPinTable::from_config(config);
    let mut errors = vec![];
    let mut by_name: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    let pin_count = map.pin_count();

    for pin in table.used_pins() {
        let number = pin.pin_number() as u32;

        if pin_count > 0 && number > pin_count {
            errors.push(ValidationError::PinNotInPackage { pin: number, package: map.package().to_string() });
            continue;
        }

        if let Some(mapping) = map.pin(number) {
            if mapping.is_read_only && pin.function_type().as_str() != mapping.default_function {
                errors.push(ValidationError::ReadOnlyPin {
                    pin: number,
                    required: mapping.default_function.clone(),
                });
            }
        }

        by_name.entry(pin.function_name()).or_default().push(number);
    }

    for (name, pins) in by_name {
        if pins.len() > 1 {
            errors.push(ValidationError::DuplicateFunction { name: name.to_string(), pins });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::gpio::FunctionType;
    use crate::config::pins::{set_pin_assignment, PinAssignment, PIN_CONFIG_SECTION};
    use crate::device::Variant;

    const CATALOG: &str = r#"{
        "32MZ2048EFH064": { "64-pin": {
            "1": { "pinName": "RE5", "pinType": "Analog", "availableFunctions": ["GPIO", "ADC"],
                   "defaultFunction": "GPIO" },
            "2": { "pinName": "VDD", "pinType": "Power", "availableFunctions": ["VDD"],
                   "defaultFunction": "VDD", "isReadOnly": true },
            "3": { "pinName": "RG6", "availableFunctions": ["GPIO", "UART_TX"], "defaultFunction": "GPIO" }
        }}
    }"#;

    fn catalog() -> Catalog {
        Catalog::parse(CATALOG, false).unwrap()
    }

    fn config_with(pins: &[(u32, &str)]) -> DeviceConfig {
        let mut config = DeviceConfig::new(Variant::MZ);
        config.select_device(Variant::MZ, "32MZ2048EFH064").unwrap();
        for (pin, function) in pins {
            set_pin_assignment(&mut config, *pin, &PinAssignment {
                selected_function: Some(function.to_string()),
                ..Default::default()
            });
        }
        config
    }

    #[test]
    fn function_not_available() {
        let errors = validate(&config_with(&[(1, "UART_TX")]), &catalog());
        assert_eq!(errors.len(), 1);
        let msg = errors[0].to_string();
        assert!(msg.contains("Pin 1"), "{}", msg);
        assert!(msg.contains("UART_TX"), "{}", msg);
        assert!(msg.contains("GPIO, ADC"), "{}", msg);
    }

    #[test]
    fn read_only_pin() {
        let errors = validate(&config_with(&[(2, "GPIO")]), &catalog());
        assert_eq!(errors, vec![ValidationError::ReadOnlyPin { pin: 2, required: "VDD".into() }]);

        assert!(validate(&config_with(&[(2, "VDD")]), &catalog()).is_empty());
    }

    #[test]
    fn all_pins_are_checked() {
        let mut config = config_with(&[(1, "SPI_CLK"), (3, "UART_TX"), (9, "ANYTHING")]);
        config.set_section_value(PIN_CONFIG_SECTION, "2", "{oops");
        let errors = validate(&config, &catalog());
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::FunctionNotAvailable { pin: 1, .. }));
        assert!(matches!(errors[1], ValidationError::BadPinEntry { pin: 2, .. }));
    }

    #[test]
    fn unknown_device_stops_pin_checks() {
        let mut config = config_with(&[(1, "UART_TX")]);
        config.select_device(Variant::MZ, "32MZ1024EFH100").unwrap();
        let errors = validate(&config, &catalog());
        assert_eq!(errors, vec![ValidationError::UnknownDevice("32MZ1024EFH100".into())]);
    }

    #[test]
    fn no_device() {
        let errors = validate(&DeviceConfig::default(), &catalog());
        assert_eq!(errors, vec![ValidationError::NoDevice]);
    }

    #[test]
    fn gpio_checks() {
        let mut config = config_with(&[]);
        let mut table = GpioPinTable::new();
        table.pin_mut(2).unwrap().set_function(FunctionType::Led);
        table.pin_mut(70).unwrap().set_function(FunctionType::Gpio);
        for n in [3, 4] {
            let pin = table.pin_mut(n).unwrap();
            pin.set_function(FunctionType::Switch);
            pin.set_function_name("BUTTON");
        }
        table.store_into(&mut config);

        let errors = validate_gpio(&config, &catalog());
        assert_eq!(errors.len(), 3, "{:?}", errors);
        assert!(errors.contains(&ValidationError::ReadOnlyPin { pin: 2, required: "VDD".into() }));
        assert!(errors.contains(&ValidationError::PinNotInPackage { pin: 70, package: "64-pin".into() }));
        assert!(errors.contains(&ValidationError::DuplicateFunction { name: "BUTTON".into(), pins: vec![3, 4] }));
    }
}
