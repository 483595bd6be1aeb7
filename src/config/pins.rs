// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

use super::DeviceConfig;
use crate::pinmap::{PeripheralMappings, PinType};

/// Section holding one JSON encoded [`PinAssignment`] per pin number
pub const PIN_CONFIG_SECTION: &str = "PinConfigurations";
/// Key of the enhanced records inside [`PIN_CONFIG_SECTION`]
pub const ENHANCED_KEY: &str = "Enhanced";

/// What the user picked for a package pin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PinAssignment {
    #[serde(default, alias = "pinName", skip_serializing_if = "Option::is_none")]
    pub pin_name: Option<String>,
    #[serde(default, alias = "selectedFunction", skip_serializing_if = "Option::is_none")]
    pub selected_function: Option<String>,
    #[serde(default, alias = "package", skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl PinAssignment {
    pub fn decode(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    pub fn encode(&self) -> String {
        // A struct of optional strings always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A pin assignment merged with the catalog data for that pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnhancedPin {
    pub pin_name: String,
    pub selected_function: String,
    pub available_functions: Vec<String>,
    pub package: String,
    pub pin_type: PinType,
    pub port: Option<String>,
    pub port_pin: Option<u32>,
    pub analog_channel: Option<String>,
    pub peripheral_mappings: PeripheralMappings,
    pub is_read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinRecord {
    Enhanced(EnhancedPin),
    /// Pins the catalog does not know keep what they had
    Legacy(PinAssignment),
}

/// Decoded entries of the pin configuration section, by ascending pin
/// number. Keys that are not pin numbers are skipped.
pub fn pin_assignments(config: &DeviceConfig) -> Vec<(u32, Result<PinAssignment, serde_json::Error>)> {
    let section = match config.section(PIN_CONFIG_SECTION) {
        Some(s) => s,
        None => return vec![],
    };

    let mut entries: Vec<_> = section.iter()
        .filter_map(|(key, value)| key.trim().parse::<u32>().ok().map(|pin| (pin, value)))
        .map(|(pin, value)| (pin, PinAssignment::decode(value)))
        .collect();
    entries.sort_by_key(|(pin, _)| *pin);
    entries
}

pub fn set_pin_assignment(config: &mut DeviceConfig, pin: u32, assignment: &PinAssignment) {
    config.set_section_value(PIN_CONFIG_SECTION, &pin.to_string(), assignment.encode());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_either_casing() {
        let a = PinAssignment::decode(r#"{"PinName":"RB5","SelectedFunction":"ADC"}"#).unwrap();
        assert_eq!(a.pin_name.as_deref(), Some("RB5"));
        assert_eq!(a.selected_function.as_deref(), Some("ADC"));
        assert_eq!(a.package, None);

        let b = PinAssignment::decode(r#"{"pinName":"RB5","selectedFunction":"ADC"}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn entries_come_back_in_pin_order() {
        let mut config = DeviceConfig::default();
        config.set_section_value(PIN_CONFIG_SECTION, "10", r#"{"SelectedFunction":"GPIO"}"#);
        config.set_section_value(PIN_CONFIG_SECTION, "2", r#"{"SelectedFunction":"ADC"}"#);
        config.set_section_value(PIN_CONFIG_SECTION, "3", "not json");
        config.set_section_value(PIN_CONFIG_SECTION, ENHANCED_KEY, "{}");

        let entries = pin_assignments(&config);
        let pins: Vec<u32> = entries.iter().map(|(p, _)| *p).collect();
        assert_eq!(pins, vec![2, 3, 10]);
        assert!(entries[1].1.is_err());
    }

    #[test]
    fn encode_round_trips() {
        let mut config = DeviceConfig::default();
        let a = PinAssignment {
            pin_name: Some("RB0".into()),
            selected_function: Some("UART_TX".into()),
            package: None,
        };
        set_pin_assignment(&mut config, 7, &a);
        assert_eq!(config.section_value(PIN_CONFIG_SECTION, "7"),
            Some(r#"{"PinName":"RB0","SelectedFunction":"UART_TX"}"#));
        assert_eq!(pin_assignments(&config)[0].1.as_ref().unwrap(), &a);
    }
}
