// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use anyhow::Result;

use crate::config::DeviceConfig;
use crate::util::read_file_str;
use crate::validate::ValidationError;

/// A configuration word and the bit fields it holds, in the order they are
/// emitted in generated sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigWord {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

pub const MZ_CONFIG_WORDS: [ConfigWord; 5] = [
    ConfigWord { name: "DEVCFG0", fields: &[
        "DEBUG", "JTAGEN", "ICESEL", "TRCEN", "BOOTISA", "FECCCON", "FSLEEP", "DBGPER",
        "SMCLR", "SOSCGAIN", "SOSCBOOST", "POSCGAIN", "POSCBOOST", "EJTAGBEN", "CP",
    ]},
    ConfigWord { name: "DEVCFG1", fields: &[
        "FNOSC", "DMTINTV", "FSOSCEN", "IESO", "POSCMOD", "OSCIOFNC", "FCKSM", "WDTPS",
        "WDTSPGM", "FWDTEN", "WINDIS", "FWDTWINSZ", "DMTCNT", "FDMTEN",
    ]},
    ConfigWord { name: "DEVCFG2", fields: &[
        "FPLLIDIV", "FPLLRNG", "FPLLICLK", "FPLLMULT", "FPLLODIV", "UPLLFSEL",
    ]},
    ConfigWord { name: "DEVCFG3", fields: &[
        "USERID", "FMIIEN", "FETHIO", "PGL1WAY", "PMDL1WAY", "IOL1WAY", "FUSBIDIO",
    ]},
    ConfigWord { name: "BF1SEQ0", fields: &["TSEQ", "CSEQ"] },
];

pub const MX_CONFIG_WORDS: [ConfigWord; 4] = [
    ConfigWord { name: "DEVCFG0", fields: &["DEBUG", "ICESEL", "PWP", "BWP", "CP"] },
    ConfigWord { name: "DEVCFG1", fields: &[
        "FNOSC", "FSOSCEN", "IESO", "POSCMOD", "OSCIOFNC", "FPBDIV", "FCKSM", "WDTPS", "FWDTEN",
    ]},
    ConfigWord { name: "DEVCFG2", fields: &[
        "FPLLIDIV", "FPLLMUL", "UPLLIDIV", "UPLLEN", "FPLLODIV",
    ]},
    ConfigWord { name: "DEVCFG3", fields: &[
        "USERID", "FSRSSEL", "FMIIEN", "FETHIO", "FCANIO", "FUSBIDIO", "FVBUSONIO",
    ]},
];

pub const PRECON_SECTION: &str = "PreconBits";
pub const PRECON_FIELDS: [&str; 3] = ["PREFEN", "PFMWS", "ECCCON"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordOption {
    pub value: String,
    pub name: String,
    pub description: String,
}

/// One setting from a device pack definition file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordDefinition {
    pub name: String,
    pub mask: String,
    pub options: Vec<WordOption>,
}

/// Parses the `CSETTING:`/`CVALUE:` line format of device pack config
/// definitions. Lines that are neither are ignored, as are values appearing
/// before the first setting.
pub fn parse_definitions(content: &str) -> Vec<WordDefinition> {
    let mut defs: Vec<WordDefinition> = vec![];

    for line in content.lines() {
        let line = line.trim_end();
        if line.starts_with("CSETTING:") {
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() < 4 {
                warn!("Malformed setting line: {}", line);
                continue;
            }
            defs.push(WordDefinition {
                name: parts[3].to_string(),
                mask: parts[1].to_string(),
                options: vec![],
            });
        } else if line.starts_with("CVALUE:") {
            let current = match defs.last_mut() {
                Some(d) => d,
                None => continue,
            };
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() < 3 {
                warn!("Malformed value line: {}", line);
                continue;
            }
            current.options.push(WordOption {
                value: parts[1].to_string(),
                name: parts[2].to_string(),
                description: parts.get(3).map(|d| d.to_string()).unwrap_or_default(),
            });
        }
    }

    defs
}

pub fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<WordDefinition>> {
    let defs = parse_definitions(&read_file_str(path)?);
    debug!("Loaded {} config word definitions", defs.len());
    Ok(defs)
}

/// Flags flat config bits whose value is not one of the defined options.
/// Bits without a definition, and definitions without options (free-form
/// values such as USERID), are not checked.
pub fn check_config_bits(config: &DeviceConfig, defs: &[WordDefinition]) -> Vec<ValidationError> {
    let mut errors = vec![];

    for (bit, value) in &config.config_bits {
        let def = match defs.iter().find(|d| &d.name == bit) {
            Some(d) if !d.options.is_empty() => d,
            _ => continue,
        };

        if !def.options.iter().any(|o| &o.name == value) {
            errors.push(ValidationError::UnknownBitValue {
                bit: bit.clone(),
                value: value.clone(),
                options: def.options.iter().map(|o| o.name.clone()).collect(),
            });
        }
    }

    errors
}
