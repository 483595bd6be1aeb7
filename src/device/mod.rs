// SPDX-License-Identifier: GPL-3.0-or-later

pub mod words;

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use words::{ConfigWord, PRECON_FIELDS, PRECON_SECTION};

/// Supported device families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variant {
    MX,
    MZ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Part number without the "PIC" prefix, e.g. 32MZ2048EFH064
    pub id: &'static str,
    pub family: &'static str,
    pub pins: u16,
}

pub const MX_DEVICES: [DeviceInfo; 4] = [
    DeviceInfo { id: "32MX470F512H", family: "PIC32MX4XX", pins: 64 },
    DeviceInfo { id: "32MX470F512L", family: "PIC32MX4XX", pins: 100 },
    DeviceInfo { id: "32MX795F512H", family: "PIC32MX7XX", pins: 64 },
    DeviceInfo { id: "32MX795F512L", family: "PIC32MX7XX", pins: 100 },
];

pub const MZ_DEVICES: [DeviceInfo; 6] = [
    DeviceInfo { id: "32MZ1024EFH064", family: "PIC32MZEF", pins: 64 },
    DeviceInfo { id: "32MZ2048EFH064", family: "PIC32MZEF", pins: 64 },
    DeviceInfo { id: "32MZ1024EFH100", family: "PIC32MZEF", pins: 100 },
    DeviceInfo { id: "32MZ2048EFH100", family: "PIC32MZEF", pins: 100 },
    DeviceInfo { id: "32MZ1024EFH144", family: "PIC32MZEF", pins: 144 },
    DeviceInfo { id: "32MZ2048EFH144", family: "PIC32MZEF", pins: 144 },
];

/// Largest package across all variants. The GPIO pin table is sized for it.
pub const MAX_PINS: u16 = 144;

pub const DEVICE_PREFIX: &str = "PIC";
pub const DEVICE_ARCH: &str = "MIPS";

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::MX, Variant::MZ];

    pub fn devices(self) -> &'static [DeviceInfo] {
        match self {
            Variant::MX => &MX_DEVICES,
            Variant::MZ => &MZ_DEVICES,
        }
    }

    pub fn series(self) -> &'static str {
        match self {
            Variant::MX => "PIC32MX",
            Variant::MZ => "PIC32MZ",
        }
    }

    pub fn default_device(self) -> &'static DeviceInfo {
        match self {
            Variant::MX => &MX_DEVICES[2],
            Variant::MZ => &MZ_DEVICES[0],
        }
    }

    pub fn cpu_clock_hz(self) -> u32 {
        match self {
            Variant::MX => 80_000_000,
            Variant::MZ => 200_000_000,
        }
    }

    pub fn config_words(self) -> &'static [ConfigWord] {
        match self {
            Variant::MX => &words::MX_CONFIG_WORDS,
            Variant::MZ => &words::MZ_CONFIG_WORDS,
        }
    }

    /// Name of the config word holding `bit`, if the variant knows about it
    pub fn section_for_bit(self, bit: &str) -> Option<&'static str> {
        self.config_words().iter()
            .find(|w| w.fields.contains(&bit))
            .map(|w| w.name)
    }

    pub fn find_device(self, id: &str) -> Option<&'static DeviceInfo> {
        let id = strip_device_prefix(id);
        self.devices().iter().find(|d| d.id.eq_ignore_ascii_case(id))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::MX => write!(f, "MX"),
            Variant::MZ => write!(f, "MZ"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown variant '{0}', expected MX or MZ")]
pub struct UnknownVariant(pub String);

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MX" | "PIC32MX" => Ok(Variant::MX),
            "MZ" | "PIC32MZ" => Ok(Variant::MZ),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// Identity strings written into the configuration document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub arch: String,
    pub family: String,
    pub series: String,
}

impl DeviceIdentity {
    pub fn derive(variant: Variant, device: &DeviceInfo) -> Self {
        Self {
            name: format!("{}{}", DEVICE_PREFIX, device.id),
            arch: DEVICE_ARCH.to_string(),
            family: device.family.to_string(),
            series: variant.series().to_string(),
        }
    }
}

pub fn strip_device_prefix(name: &str) -> &str {
    name.strip_prefix(DEVICE_PREFIX).unwrap_or(name)
}

lazy_static! {
    static ref PACKAGE_SUFFIX: Regex = Regex::new(r"(\d{3})$").unwrap();
}

/// Package name ("64-pin") for a device id, with or without the PIC prefix.
/// Known parts use the device table, others fall back to the trailing pin
/// count digits of the part number.
pub fn infer_package(device: &str) -> Option<String> {
    let id = strip_device_prefix(device);
    let known = Variant::ALL.iter()
        .flat_map(|v| v.devices())
        .find(|d| d.id.eq_ignore_ascii_case(id));

    if let Some(d) = known {
        return Some(format!("{}-pin", d.pins));
    }

    PACKAGE_SUFFIX.captures(id)
        .and_then(|c| c[1].parse::<u16>().ok())
        .map(|pins| format!("{}-pin", pins))
}
