// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DeviceConfig;
use crate::device::MAX_PINS;

pub const GPIO_SECTION: &str = "GpioConfig";

/// Pins per port control register
pub const PINS_PER_REG: u16 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FunctionType {
    None,
    #[serde(rename = "UART_TX")] UartTx,
    #[serde(rename = "UART_RX")] UartRx,
    #[serde(rename = "SPI_CLK")] SpiClk,
    #[serde(rename = "SPI_MOSI")] SpiMosi,
    #[serde(rename = "SPI_MISO")] SpiMiso,
    #[serde(rename = "SPI_CS")] SpiCs,
    #[serde(rename = "I2C_SCL")] I2cScl,
    #[serde(rename = "I2C_SDA")] I2cSda,
    #[serde(rename = "PWM")] Pwm,
    #[serde(rename = "ADC")] Adc,
    #[serde(rename = "TIMER")] Timer,
    #[serde(rename = "LED")] Led,
    #[serde(rename = "SWITCH")] Switch,
    #[serde(rename = "GPIO")] Gpio,
}

impl FunctionType {
    pub const ALL: [FunctionType; 15] = [
        FunctionType::None, FunctionType::UartTx, FunctionType::UartRx, FunctionType::SpiClk,
        FunctionType::SpiMosi, FunctionType::SpiMiso, FunctionType::SpiCs, FunctionType::I2cScl,
        FunctionType::I2cSda, FunctionType::Pwm, FunctionType::Adc, FunctionType::Timer,
        FunctionType::Led, FunctionType::Switch, FunctionType::Gpio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FunctionType::None => "None",
            FunctionType::UartTx => "UART_TX",
            FunctionType::UartRx => "UART_RX",
            FunctionType::SpiClk => "SPI_CLK",
            FunctionType::SpiMosi => "SPI_MOSI",
            FunctionType::SpiMiso => "SPI_MISO",
            FunctionType::SpiCs => "SPI_CS",
            FunctionType::I2cScl => "I2C_SCL",
            FunctionType::I2cSda => "I2C_SDA",
            FunctionType::Pwm => "PWM",
            FunctionType::Adc => "ADC",
            FunctionType::Timer => "TIMER",
            FunctionType::Led => "LED",
            FunctionType::Switch => "SWITCH",
            FunctionType::Gpio => "GPIO",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown pin function '{0}'")]
pub struct UnknownFunction(pub String);

impl FromStr for FunctionType {
    type Err = UnknownFunction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FunctionType::ALL.iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownFunction(s.to_string()))
    }
}

lazy_static! {
    // Names produced by auto_function_name(), for any function type
    static ref AUTO_FUNCTION_NAME: Regex = {
        let types: Vec<&str> = FunctionType::ALL[1..].iter().map(|f| f.as_str()).collect();
        Regex::new(&format!(r"^({})_\d+$", types.join("|"))).unwrap()
    };
}

fn auto_function_name(function: FunctionType, pin: u16) -> String {
    match function {
        FunctionType::None => String::new(),
        f => format!("{}_{}", f, pin),
    }
}

fn is_auto_function_name(name: &str) -> bool {
    name.is_empty() || AUTO_FUNCTION_NAME.is_match(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioPinConfig {
    pin_number: u16,
    pin_name: String,
    function_type: FunctionType,
    function_name: String,
}

impl GpioPinConfig {
    pub fn new(pin_number: u16) -> Self {
        Self {
            pin_number,
            pin_name: Self::default_pin_name(pin_number),
            function_type: FunctionType::None,
            function_name: String::new(),
        }
    }

    pub fn default_pin_name(pin_number: u16) -> String {
        format!("PIN_{:02}", pin_number)
    }

    pub fn pin_number(&self) -> u16 {
        self.pin_number
    }

    pub fn pin_name(&self) -> &str {
        &self.pin_name
    }

    pub fn function_type(&self) -> FunctionType {
        self.function_type
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Control register holding this pin, 32 pins per register, zero-based
    pub fn ctrl_reg_num(&self) -> u16 {
        self.pin_number.saturating_sub(1) / PINS_PER_REG
    }

    /// Bit of this pin inside its control register
    pub fn ctrl_reg_index(&self) -> u16 {
        self.pin_number.saturating_sub(1) % PINS_PER_REG
    }

    pub fn set_pin_name(&mut self, name: &str) {
        let name = name.trim();
        self.pin_name = if name.is_empty() {
            Self::default_pin_name(self.pin_number)
        } else {
            name.to_string()
        };
    }

    /// Changes the function. A custom function name survives the change, an
    /// automatic one follows the new function.
    pub fn set_function(&mut self, function: FunctionType) {
        self.function_type = function;
        if is_auto_function_name(&self.function_name) {
            self.function_name = auto_function_name(function, self.pin_number);
        }
    }

    /// Sets a custom function name. An empty name goes back to the automatic one.
    pub fn set_function_name(&mut self, name: &str) {
        let name = name.trim();
        self.function_name = if name.is_empty() {
            auto_function_name(self.function_type, self.pin_number)
        } else {
            name.to_string()
        };
    }

    pub fn is_used(&self) -> bool {
        self.function_type != FunctionType::None
    }
}

/// How a pin is stored in the GPIO section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpioEntry {
    pub pin_name: String,
    pub function_type: FunctionType,
    #[serde(default)]
    pub function_name: String,
}

/// All addressable pins of the largest package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioPinTable {
    pins: Vec<GpioPinConfig>,
}

impl Default for GpioPinTable {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioPinTable {
    pub fn new() -> Self {
        let pins = (1..=MAX_PINS).map(GpioPinConfig::new).collect();
        Self { pins }
    }

    pub fn pin(&self, pin_number: u16) -> Option<&GpioPinConfig> {
        pin_number.checked_sub(1).and_then(|i| self.pins.get(i as usize))
    }

    pub fn pin_mut(&mut self, pin_number: u16) -> Option<&mut GpioPinConfig> {
        pin_number.checked_sub(1).and_then(move |i| self.pins.get_mut(i as usize))
    }

    pub fn pins(&self) -> &[GpioPinConfig] {
        &self.pins
    }

    pub fn used_pins(&self) -> impl Iterator<Item = &GpioPinConfig> {
        self.pins.iter().filter(|p| p.is_used())
    }

    /// Restores pin assignments from the GPIO section. Entries that are out
    /// of range or do not decode are skipped.
    pub fn from_config(config: &DeviceConfig) -> Self {
        let mut table = Self::new();

        let section = match config.section(GPIO_SECTION) {
            Some(s) => s,
            None => return table,
        };

        for (key, value) in section {
            let pin = match key.trim().parse::<u16>().ok().and_then(|n| table.pin_mut(n)) {
                Some(pin) => pin,
                None => {
                    warn!("Ignoring GPIO entry for invalid pin '{}'", key);
                    continue;
                }
            };
            let entry: GpioEntry = match serde_json::from_str(value) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Ignoring GPIO entry for pin {}: {}", key, e);
                    continue;
                }
            };

            pin.set_pin_name(&entry.pin_name);
            pin.function_type = entry.function_type;
            pin.set_function_name(&entry.function_name);
        }

        table
    }

    /// Writes the used pins into the GPIO section, replacing it. When no pin
    /// has a function the section is removed.
    pub fn store_into(&self, config: &mut DeviceConfig) {
        config.remove_section(GPIO_SECTION);

        for pin in self.used_pins() {
            let entry = GpioEntry {
                pin_name: pin.pin_name.clone(),
                function_type: pin.function_type,
                function_name: pin.function_name.clone(),
            };
            match serde_json::to_string(&entry) {
                Ok(value) => config.set_section_value(GPIO_SECTION, &pin.pin_number.to_string(), value),
                Err(e) => warn!("Failed to encode GPIO pin {}: {}", pin.pin_number, e),
            }
        }

        debug!("Stored {} GPIO pins", self.used_pins().count());
    }
}
