// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Write;

use crate::config::pins::pin_assignments;
use crate::config::DeviceConfig;
use crate::pinmap::{Catalog, PinType};
use crate::validate::resolve_device;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PinUsage {
    pub power: Vec<String>,
    /// Peripheral label → member pins, both in the order first seen
    pub peripherals: Vec<(String, Vec<String>)>,
    pub analog: Vec<String>,
    pub digital: Vec<String>,
}

impl PinUsage {
    fn add_peripheral(&mut self, peripheral: &str, entry: String) {
        match self.peripherals.iter_mut().find(|(p, _)| p == peripheral) {
            Some((_, pins)) => pins.push(entry),
            None => self.peripherals.push((peripheral.to_string(), vec![entry])),
        }
    }
}

/// Sorts the configured pins into report sections. Entries that do not decode
/// or that the catalog does not know are left out.
pub fn classify(config: &DeviceConfig, catalog: &Catalog) -> PinUsage {
    let mut usage = PinUsage::default();

    let map = match resolve_device(config, catalog) {
        Ok(map) => map,
        Err(_) => return usage,
    };

    for (pin, assignment) in pin_assignments(config) {
        let assignment = match assignment {
            Ok(a) => a,
            Err(_) => continue,
        };
        let mapping = match map.pin(pin) {
            Some(m) => m,
            None => continue,
        };

        let function = assignment.selected_function.as_deref().unwrap_or("GPIO");
        let name = assignment.pin_name.as_deref().unwrap_or("");

        match mapping.pin_type {
            PinType::Power => usage.power.push(format!("Pin {}: {}", pin, name)),
            PinType::Analog if function.starts_with("ADC") => {
                usage.analog.push(format!("Pin {}: {} -> {}", pin, name, function))
            }
            PinType::Analog => usage.digital.push(format!("Pin {}: {} -> {}", pin, name, function)),
            _ if function == "GPIO" => usage.digital.push(format!("Pin {}: {}", pin, name)),
            _ => usage.digital.push(format!("Pin {}: {} -> {}", pin, name, function)),
        }

        for (fragment, label) in mapping.peripheral_mappings.iter() {
            if function.contains(fragment) {
                usage.add_peripheral(fragment, format!("Pin {} ({})", pin, label));
            }
        }
    }

    usage
}

/// Plain text pin usage report
pub fn pin_usage_report(config: &DeviceConfig, catalog: &Catalog) -> String {
    let mut report = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut report, config, catalog);
    report
}

fn write_report(out: &mut String, config: &DeviceConfig, catalog: &Catalog) -> std::fmt::Result {
    writeln!(out, "Pin Usage Report")?;
    writeln!(out, "================")?;
    writeln!(out)?;

    if let Ok(map) = resolve_device(config, catalog) {
        writeln!(out, "Device: {}", config.device_name())?;
        writeln!(out, "Package: {}", map.package())?;
        writeln!(out)?;
    }

    let usage = classify(config, catalog);

    writeln!(out, "Power Pins:")?;
    for pin in &usage.power {
        writeln!(out, "  {}", pin)?;
    }
    writeln!(out)?;

    writeln!(out, "Peripheral Usage:")?;
    for (peripheral, pins) in &usage.peripherals {
        writeln!(out, "  {}:", peripheral)?;
        for pin in pins {
            writeln!(out, "    {}", pin)?;
        }
    }
    writeln!(out)?;

    writeln!(out, "Analog Pins:")?;
    for pin in &usage.analog {
        writeln!(out, "  {}", pin)?;
    }
    writeln!(out)?;

    writeln!(out, "GPIO/Digital Pins:")?;
    for pin in &usage.digital {
        writeln!(out, "  {}", pin)?;
    }

    Ok(())
}
