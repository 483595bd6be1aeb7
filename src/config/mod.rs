// SPDX-License-Identifier: GPL-3.0-or-later

//! The project configuration document.
//!
//! `sections` is the authoritative representation. `config_bits` and
//! `precon_bits` are the flat views older documents were written with, and are
//! kept in sync on load by [`migrate::reconcile`].

pub mod gpio;
pub mod migrate;
pub mod pins;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::device::{DeviceIdentity, Variant, PRECON_FIELDS, PRECON_SECTION};
use crate::util::is_yaml;

pub type Section = BTreeMap<String, String>;
pub type Sections = BTreeMap<String, Section>;

pub const PERIPHERAL_SECTION: &str = "PeripheralConfig";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("failed to access {}", .path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to serialize configuration: {0}")]
    Serialize(String),
    #[error("device '{id}' is not a {variant} device")]
    UnknownDevice { variant: Variant, id: String },
    #[error("'{0}' is not a PRECON field, expected one of PREFEN, PFMWS, ECCCON")]
    UnknownPreconField(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) variant: Option<Variant>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) device_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) device_arch: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) device_family: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) device_series: String,
    pub(crate) config_bits: BTreeMap<String, String>,
    pub(crate) precon_bits: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) sections: Sections,
}

impl DeviceConfig {
    pub fn new(variant: Variant) -> Self {
        let mut config = Self::default();
        config.select_variant(variant);
        config
    }

    /// Loads a configuration document. A document that cannot be parsed
    /// yields an empty configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with_outcome(path).map(|(config, _)| config)
    }

    /// Like [`load`](Self::load), also handing back the parse error the
    /// document was recovered from, if any.
    pub fn load_with_outcome(path: impl AsRef<Path>) -> Result<(Self, Option<ConfigError>), ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

        let parsed = String::from_utf8(content)
            .map_err(|e| e.to_string())
            .and_then(|content| migrate::parse_document(&content, is_yaml(path)));

        match parsed {
            Ok(raw) => {
                let config = migrate::migrate(raw);
                debug!("Loaded {} variant={:?} config_bits={} precon_bits={} sections={}",
                    path.display(), config.variant, config.config_bits.len(),
                    config.precon_bits.len(), config.sections.len());
                Ok((config, None))
            }
            Err(message) => {
                warn!("Failed to parse {}, using an empty configuration: {}", path.display(), message);
                let err = ConfigError::Parse { path: path.to_path_buf(), message };
                Ok((Self::default(), Some(err)))
            }
        }
    }

    pub fn to_document(&self, yaml: bool) -> Result<String, ConfigError> {
        let mut doc = if yaml {
            serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        };
        if !doc.ends_with('\n') {
            doc.push('\n');
        }
        Ok(doc)
    }

    /// Writes the full model, replacing whatever is on disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let doc = self.to_document(is_yaml(path))?;
        std::fs::write(path, doc)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn variant(&self) -> Option<Variant> {
        self.variant
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device_arch(&self) -> &str {
        &self.device_arch
    }

    pub fn device_family(&self) -> &str {
        &self.device_family
    }

    pub fn device_series(&self) -> &str {
        &self.device_series
    }

    pub fn config_bits(&self) -> &BTreeMap<String, String> {
        &self.config_bits
    }

    pub fn precon_bits(&self) -> &BTreeMap<String, String> {
        &self.precon_bits
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    /// True when nothing has been configured, which is also what a document
    /// that failed to parse loads as.
    pub fn is_empty(&self) -> bool {
        self.variant.is_none()
            && self.device_name.is_empty()
            && self.config_bits.is_empty()
            && self.precon_bits.is_empty()
            && self.sections.is_empty()
    }

    /// Selects the variant with its default device
    pub fn select_variant(&mut self, variant: Variant) {
        let device = variant.default_device();
        self.apply_identity(variant, DeviceIdentity::derive(variant, device));
    }

    pub fn select_device(&mut self, variant: Variant, id: &str) -> Result<(), ConfigError> {
        let device = variant.find_device(id)
            .ok_or_else(|| ConfigError::UnknownDevice { variant, id: id.to_string() })?;
        self.apply_identity(variant, DeviceIdentity::derive(variant, device));
        Ok(())
    }

    pub(crate) fn apply_identity(&mut self, variant: Variant, identity: DeviceIdentity) {
        self.variant = Some(variant);
        self.device_name = identity.name;
        self.device_arch = identity.arch;
        self.device_family = identity.family;
        self.device_series = identity.series;
    }

    pub fn section(&self, section: &str) -> Option<&Section> {
        self.sections.get(section)
    }

    pub fn section_value(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)
            .and_then(|s| s.get(key))
            .map(|v| v.as_str())
    }

    pub fn set_section_value(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections.entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn remove_section_value(&mut self, section: &str, key: &str) -> Option<String> {
        self.sections.get_mut(section).and_then(|s| s.remove(key))
    }

    pub fn remove_section(&mut self, section: &str) -> Option<Section> {
        self.sections.remove(section)
    }

    /// Sets a configuration bit in the flat view and, when the current
    /// variant knows which config word holds it, in that section as well.
    pub fn set_config_bit(&mut self, bit: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(word) = self.variant.and_then(|v| v.section_for_bit(bit)) {
            self.set_section_value(word, bit, value.clone());
        } else {
            debug!("{} is not part of a known config word, storing flat only", bit);
        }
        self.config_bits.insert(bit.to_string(), value);
    }

    pub fn config_bit(&self, bit: &str) -> Option<&str> {
        self.config_bits.get(bit).map(|v| v.as_str())
    }

    pub fn set_precon_bit(&mut self, field: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        if !PRECON_FIELDS.contains(&field) {
            return Err(ConfigError::UnknownPreconField(field.to_string()));
        }
        let value = value.into();
        self.set_section_value(PRECON_SECTION, field, value.clone());
        self.precon_bits.insert(field.to_string(), value);
        Ok(())
    }

    pub fn precon_bit(&self, field: &str) -> Option<&str> {
        self.precon_bits.get(field).map(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::scratch_dir;

    #[test]
    fn section_accessors() {
        let mut config = DeviceConfig::default();
        assert_eq!(config.section_value("PeripheralConfig", "UART1"), None);
        config.set_section_value("PeripheralConfig", "UART1", "ON");
        assert_eq!(config.section_value("PeripheralConfig", "UART1"), Some("ON"));
        config.set_section_value("PeripheralConfig", "UART1", "OFF");
        assert_eq!(config.section_value("PeripheralConfig", "UART1"), Some("OFF"));
        assert_eq!(config.sections().len(), 1);
    }

    #[test]
    fn config_bits_land_in_their_word() {
        let mut config = DeviceConfig::new(Variant::MZ);
        config.set_config_bit("FPLLMULT", "MUL_50");
        config.set_config_bit("CUSTOM", "1");
        assert_eq!(config.section_value("DEVCFG2", "FPLLMULT"), Some("MUL_50"));
        assert_eq!(config.config_bit("FPLLMULT"), Some("MUL_50"));
        assert_eq!(config.config_bit("CUSTOM"), Some("1"));
        assert_eq!(config.sections().len(), 1);
    }

    #[test]
    fn precon_fields_are_fixed() {
        let mut config = DeviceConfig::default();
        config.set_precon_bit("PFMWS", "2").unwrap();
        assert_eq!(config.precon_bit("PFMWS"), Some("2"));
        assert_eq!(config.section_value(PRECON_SECTION, "PFMWS"), Some("2"));
        assert!(matches!(config.set_precon_bit("CHECON", "1"), Err(ConfigError::UnknownPreconField(_))));
    }

    #[test]
    fn select_device_rejects_other_variant() {
        let mut config = DeviceConfig::new(Variant::MX);
        assert_eq!(config.device_name(), "PIC32MX795F512H");
        let err = config.select_device(Variant::MX, "32MZ2048EFH064").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDevice { .. }));
        assert_eq!(config.device_name(), "PIC32MX795F512H");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = scratch_dir("missing");
        let err = DeviceConfig::load(dir.join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn malformed_document_degrades_to_empty() {
        let dir = scratch_dir("malformed");
        let path = dir.join("device_config.json");
        std::fs::write(&path, "{ \"variant\": \"MZ\", \"configBits\": ").unwrap();

        let (config, err) = DeviceConfig::load_with_outcome(&path).unwrap();
        assert!(config.is_empty());
        assert!(matches!(err, Some(ConfigError::Parse { .. })));
    }

    #[test]
    fn structurally_wrong_document_degrades_to_empty() {
        let dir = scratch_dir("wrong-shape");
        let path = dir.join("device_config.json");
        std::fs::write(&path, r#"{ "variant": "MZ", "configBits": ["DEBUG"] }"#).unwrap();

        let config = DeviceConfig::load(&path).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn save_uses_canonical_casing() {
        let mut config = DeviceConfig::new(Variant::MZ);
        config.set_config_bit("DEBUG", "OFF");
        let doc = config.to_document(false).unwrap();
        for key in ["\"variant\"", "\"deviceName\"", "\"deviceArch\"", "\"deviceFamily\"",
                    "\"deviceSeries\"", "\"configBits\"", "\"preconBits\"", "\"sections\""] {
            assert!(doc.contains(key), "missing {} in {}", key, doc);
        }
    }

    #[test]
    fn yaml_round_trip() {
        let dir = scratch_dir("yaml");
        let path = dir.join("device_config.yaml");
        let mut config = DeviceConfig::new(Variant::MX);
        config.set_config_bit("FPBDIV", "DIV_1");
        config.set_precon_bit("PREFEN", "3").unwrap();
        config.save(&path).unwrap();

        let loaded = DeviceConfig::load(&path).unwrap();
        assert_eq!(loaded.variant(), Some(Variant::MX));
        assert_eq!(loaded.device_name(), config.device_name());
        assert_eq!(loaded.sections(), config.sections());
        assert_eq!(loaded.precon_bits(), config.precon_bits());
        assert_eq!(loaded.config_bit("FPBDIV"), Some("DIV_1"));
    }
}
