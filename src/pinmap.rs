// SPDX-License-Identifier: GPL-3.0-or-later

//! Pin mapping catalog: what every pin of a device package can be used for.
//!
//! The catalog document maps device → package → pin number → [`PinMapping`].
//! Device keys may carry the `PIC` prefix or not.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::device::{infer_package, strip_device_prefix};
use crate::util::is_yaml;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("pin mapping file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}", .path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse pin mappings: {0}")]
    Parse(String),
    #[error("device {device} package {package}: '{key}' is not a pin number")]
    BadPinKey { device: String, package: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PinType {
    Power,
    Analog,
    Digital,
    Other(String),
}

impl From<String> for PinType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Power" => PinType::Power,
            "Analog" => PinType::Analog,
            "Digital" => PinType::Digital,
            _ => PinType::Other(s),
        }
    }
}

impl From<PinType> for String {
    fn from(t: PinType) -> Self {
        match t {
            PinType::Power => "Power".to_string(),
            PinType::Analog => "Analog".to_string(),
            PinType::Digital => "Digital".to_string(),
            PinType::Other(s) => s,
        }
    }
}

impl Default for PinType {
    fn default() -> Self {
        PinType::Digital
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PinMapping {
    #[serde(alias = "PinName")]
    pub pin_name: String,
    #[serde(alias = "PinType")]
    pub pin_type: PinType,
    #[serde(alias = "AvailableFunctions")]
    pub available_functions: Vec<String>,
    #[serde(alias = "DefaultFunction")]
    pub default_function: String,
    #[serde(alias = "IsReadOnly")]
    pub is_read_only: bool,
    #[serde(alias = "Port")]
    pub port: Option<String>,
    #[serde(alias = "PortPin")]
    pub port_pin: Option<u32>,
    #[serde(alias = "AnalogChannel")]
    pub analog_channel: Option<String>,
    #[serde(alias = "PeripheralMappings")]
    pub peripheral_mappings: PeripheralMappings,
}

/// Function name fragment → peripheral label, kept in the order the catalog
/// lists them. A repeated fragment keeps its first position and its last label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PeripheralMappings(Vec<(String, String)>);

impl PeripheralMappings {
    pub fn insert(&mut self, fragment: impl Into<String>, label: impl Into<String>) {
        let fragment = fragment.into();
        let label = label.into();
        match self.0.iter_mut().find(|(f, _)| *f == fragment) {
            Some((_, l)) => *l = label,
            None => self.0.push((fragment, label)),
        }
    }

    pub fn get(&self, fragment: &str) -> Option<&str> {
        self.0.iter().find(|(f, _)| f == fragment).map(|(_, l)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(f, l)| (f.as_str(), l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<F: Into<String>, L: Into<String>> FromIterator<(F, L)> for PeripheralMappings {
    fn from_iter<I: IntoIterator<Item = (F, L)>>(iter: I) -> Self {
        let mut mappings = Self::default();
        for (fragment, label) in iter {
            mappings.insert(fragment, label);
        }
        mappings
    }
}

impl Serialize for PeripheralMappings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (fragment, label) in &self.0 {
            map.serialize_entry(fragment, label)?;
        }
        map.end()
    }
}

struct PeripheralMappingsVisitor;

impl<'de> Visitor<'de> for PeripheralMappingsVisitor {
    type Value = PeripheralMappings;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of function name fragments to peripheral labels")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut mappings = PeripheralMappings::default();
        while let Some((fragment, label)) = access.next_entry::<String, String>()? {
            mappings.insert(fragment, label);
        }
        Ok(mappings)
    }
}

impl<'de> Deserialize<'de> for PeripheralMappings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PeripheralMappingsVisitor)
    }
}

impl PinMapping {
    pub fn allows(&self, function: &str) -> bool {
        self.available_functions.iter().any(|f| f == function)
    }
}

type RawCatalog = BTreeMap<String, BTreeMap<String, BTreeMap<String, PinMapping>>>;

/// Pins of one package, by pin number
pub type PackagePins = BTreeMap<u32, PinMapping>;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    // device id (no prefix) -> package -> pins
    devices: BTreeMap<String, BTreeMap<String, PackagePins>>,
}

/// The pins of the package a configuration targets
#[derive(Debug, Clone, Copy)]
pub struct DeviceMap<'a> {
    device: &'a str,
    package: &'a str,
    pins: &'a PackagePins,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|source| CatalogError::Io { path: path.to_path_buf(), source })?;
        let catalog = Self::parse(&content, is_yaml(path))?;
        debug!("Loaded pin mappings for {} devices from {}", catalog.devices.len(), path.display());
        Ok(catalog)
    }

    pub fn parse(content: &str, yaml: bool) -> Result<Self, CatalogError> {
        let raw: RawCatalog = if yaml {
            serde_yaml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?
        } else {
            serde_json::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?
        };

        let mut devices = BTreeMap::new();
        for (device, packages) in raw {
            let device = strip_device_prefix(&device).to_ascii_uppercase();
            let mut by_package = BTreeMap::new();
            for (package, pins) in packages {
                let mut by_pin = PackagePins::new();
                for (key, mapping) in pins {
                    let pin = key.trim().parse::<u32>().map_err(|_| CatalogError::BadPinKey {
                        device: device.clone(),
                        package: package.clone(),
                        key: key.clone(),
                    })?;
                    by_pin.insert(pin, mapping);
                }
                by_package.insert(package, by_pin);
            }
            devices.insert(device, by_package);
        }

        Ok(Self { devices })
    }

    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(|d| d.as_str())
    }

    /// Resolves a device name such as `PIC32MZ2048EFH064` to its pin map.
    /// The package comes from the part number; a device listing a single
    /// package uses it regardless.
    pub fn select(&self, device_name: &str) -> Option<DeviceMap<'_>> {
        let id = strip_device_prefix(device_name.trim()).to_ascii_uppercase();
        let (device, packages) = self.devices.get_key_value(&id)?;

        let inferred = infer_package(&id);
        let found = inferred.as_ref()
            .and_then(|p| packages.get_key_value(p))
            .or_else(|| match packages.len() {
                1 => packages.iter().next(),
                _ => None,
            });

        match found {
            Some((package, pins)) => Some(DeviceMap { device: device.as_str(), package: package.as_str(), pins }),
            None => {
                debug!("No package {:?} for device {} in pin mappings", inferred, id);
                None
            }
        }
    }
}

impl<'a> DeviceMap<'a> {
    pub fn device(&self) -> &'a str {
        self.device
    }

    pub fn package(&self) -> &'a str {
        self.package
    }

    pub fn pin(&self, pin: u32) -> Option<&'a PinMapping> {
        self.pins.get(&pin)
    }

    pub fn pins(&self) -> impl Iterator<Item = (u32, &'a PinMapping)> {
        self.pins.iter().map(|(n, m)| (*n, m))
    }

    /// Pin count of the package ("100-pin" → 100), falling back to the
    /// highest pin the catalog lists
    pub fn pin_count(&self) -> u32 {
        self.package.split('-').next()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or_else(|| self.pins.keys().next_back().copied().unwrap_or(0))
    }
}
