// SPDX-License-Identifier: GPL-3.0-or-later

//! Turns a persisted document, whatever schema generation wrote it, into the
//! canonical [`DeviceConfig`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::pins::{self, EnhancedPin, PinRecord, ENHANCED_KEY, PIN_CONFIG_SECTION};
use super::{DeviceConfig, Sections};
use crate::device::{DeviceIdentity, Variant, PRECON_SECTION};
use crate::pinmap::DeviceMap;

/// Top level fields, in the casing they are written with
const CANONICAL_KEYS: [&str; 8] = [
    "variant", "deviceName", "deviceArch", "deviceFamily", "deviceSeries",
    "configBits", "preconBits", "sections",
];

/// Package assumed for pin entries that never recorded one
const DEFAULT_PACKAGE: &str = "64-pin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Only the flat `configBits`/`preconBits` bags
    Flat,
    /// Carries `sections`
    Sectioned,
}

/// A configuration document as read from disk, before migration
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    pub variant: Option<String>,
    pub device_name: Option<String>,
    pub device_arch: Option<String>,
    pub device_family: Option<String>,
    pub device_series: Option<String>,
    pub config_bits: Option<BTreeMap<String, String>>,
    pub precon_bits: Option<BTreeMap<String, String>>,
    pub sections: Option<Sections>,
}

impl RawDocument {
    pub fn schema(&self) -> Schema {
        match self.sections {
            Some(_) => Schema::Sectioned,
            None => Schema::Flat,
        }
    }
}

/// Parses the document text. Top level field names are matched without
/// regard to case and unknown fields are dropped.
pub fn parse_document(content: &str, yaml: bool) -> Result<RawDocument, String> {
    let value: Value = if yaml {
        serde_yaml::from_str(content).map_err(|e| e.to_string())?
    } else {
        serde_json::from_str(content).map_err(|e| e.to_string())?
    };

    let fields = match value {
        Value::Object(fields) => fields,
        other => return Err(format!("expected an object at the top level, found {}", kind(&other))),
    };

    let mut canonical = Map::new();
    for (key, value) in fields {
        match CANONICAL_KEYS.iter().find(|k| k.eq_ignore_ascii_case(&key)) {
            Some(k) => { canonical.insert(k.to_string(), value); }
            None => trace!("Ignoring unknown field {}", key),
        }
    }

    for bag in ["configBits", "preconBits"] {
        if let Some(value) = canonical.get_mut(bag) {
            stringify_values(value);
        }
    }
    if let Some(Value::Object(sections)) = canonical.get_mut("sections") {
        sections.values_mut().for_each(stringify_values);
    }

    serde_json::from_value(Value::Object(canonical)).map_err(|e| e.to_string())
}

// Hand written YAML gives `PFMWS: 2` or `FWDTEN: true`. Values are strings
// in the model, so numbers and booleans are taken as written and a null value
// is an empty string.
fn stringify_values(bag: &mut Value) {
    if let Value::Object(fields) = bag {
        for value in fields.values_mut() {
            match value {
                Value::Number(n) => *value = Value::String(n.to_string()),
                Value::Bool(b) => *value = Value::String(b.to_string()),
                Value::Null => *value = Value::String(String::new()),
                _ => {}
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn migrate(raw: RawDocument) -> DeviceConfig {
    debug!("Migrating document schema={:?}", raw.schema());

    let variant = raw.variant.as_deref()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| match v.parse::<Variant>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("{}", e);
                None
            }
        });

    let mut config = DeviceConfig {
        variant,
        device_name: raw.device_name.unwrap_or_default(),
        device_arch: raw.device_arch.unwrap_or_default(),
        device_family: raw.device_family.unwrap_or_default(),
        device_series: raw.device_series.unwrap_or_default(),
        config_bits: raw.config_bits.unwrap_or_default(),
        precon_bits: raw.precon_bits.unwrap_or_default(),
        sections: raw.sections.unwrap_or_default(),
    };

    // Identity strings follow from the variant and part number. Documents
    // written before they were stored only carry the part number.
    if let Some(variant) = variant {
        if let Some(device) = variant.find_device(&config.device_name) {
            config.apply_identity(variant, DeviceIdentity::derive(variant, device));
        } else if !config.device_name.is_empty() {
            warn!("Device {} is not a known {} part", config.device_name, variant);
        }
    }

    reconcile(&mut config);
    config
}

/// Mirrors sectioned values into the flat bags. A key already present in the
/// flat bag keeps its value, so edits made to older documents survive.
/// Every section feeds `config_bits`; `PreconBits` also feeds `precon_bits`.
pub fn reconcile(config: &mut DeviceConfig) {
    for (section, fields) in &config.sections {
        for (key, value) in fields {
            if !config.config_bits.contains_key(key) {
                trace!("{}.{} mirrored into configBits", section, key);
                config.config_bits.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(precon) = config.sections.get(PRECON_SECTION) {
        for (key, value) in precon {
            if !config.precon_bits.contains_key(key) {
                config.precon_bits.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Rewrites the pin assignments into their enhanced form, merging in what the
/// catalog knows about each pin. The result is stored next to the original
/// entries under `PinConfigurations/Enhanced`. Returns the number of entries
/// written.
pub fn enhance_pin_configurations(config: &mut DeviceConfig, map: &DeviceMap) -> usize {
    if config.section(PIN_CONFIG_SECTION).is_none() {
        return 0;
    }

    let mut enhanced: BTreeMap<u32, PinRecord> = BTreeMap::new();

    for (pin, assignment) in pins::pin_assignments(config) {
        let assignment = match assignment {
            Ok(a) => a,
            Err(e) => {
                debug!("Skipping pin {}: {}", pin, e);
                continue;
            }
        };

        let record = match map.pin(pin) {
            Some(mapping) => PinRecord::Enhanced(EnhancedPin {
                pin_name: assignment.pin_name.unwrap_or_else(|| mapping.pin_name.clone()),
                selected_function: assignment.selected_function
                    .unwrap_or_else(|| mapping.default_function.clone()),
                available_functions: mapping.available_functions.clone(),
                package: assignment.package.unwrap_or_else(|| DEFAULT_PACKAGE.to_string()),
                pin_type: mapping.pin_type.clone(),
                port: mapping.port.clone(),
                port_pin: mapping.port_pin,
                analog_channel: mapping.analog_channel.clone(),
                peripheral_mappings: mapping.peripheral_mappings.clone(),
                is_read_only: mapping.is_read_only,
            }),
            None => PinRecord::Legacy(assignment),
        };
        enhanced.insert(pin, record);
    }

    let count = enhanced.len();
    match serde_json::to_string_pretty(&enhanced) {
        Ok(doc) => config.set_section_value(PIN_CONFIG_SECTION, ENHANCED_KEY, doc),
        Err(e) => warn!("Failed to encode enhanced pin configurations: {}", e),
    }
    info!("Enhanced {} pin configurations for {} ({})", count, map.device(), map.package());
    count
}
