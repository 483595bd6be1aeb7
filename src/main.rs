// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use clap::{AppSettings, Parser, Subcommand};
use anyhow::{bail, Context, Result};
use env_logger::fmt::Color;
use log::LevelFilter;

use pic32cfg::config::gpio::{FunctionType, GpioPinTable};
use pic32cfg::config::migrate::enhance_pin_configurations;
use pic32cfg::config::pins::{set_pin_assignment, PinAssignment};
use pic32cfg::device::words;
use pic32cfg::render::{self, ExternalEngine, TemplateSearch};
use pic32cfg::{report, validate, Catalog, DeviceConfig, Variant};

#[macro_use]
extern crate log;

/// Configuration bits and pin functions for PIC32 projects
#[derive(Parser, Debug)]
#[clap(
    global_setting(AppSettings::DeriveDisplayOrder)
)]
pub struct Args {
    /// Configuration document
    config: PathBuf,

    /// Verbosity. Can be repeated
    #[clap(short, long, parse(from_occurrences))]
    verbose: u8,

    #[clap(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write a fresh configuration for a device
    New {
        variant: Variant,
        /// Part number, e.g. 32MZ2048EFH064. Defaults to the variant's default part
        device: Option<String>,
    },
    /// Print the configuration
    Show,
    /// Set a configuration bit
    SetBit { name: String, value: String },
    /// Set a PRECON field (PREFEN, PFMWS, ECCCON)
    SetPrecon { name: String, value: String },
    /// Set a value in a named section
    SetSection { section: String, key: String, value: String },
    /// Assign a GPIO function to a pin
    Pin {
        number: u16,
        function: FunctionType,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        function_name: Option<String>,
    },
    /// Select the function of a package pin
    Assign {
        pin: u32,
        function: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        package: Option<String>,
    },
    /// Check pin assignments against the pin mappings
    Validate {
        pinmap: PathBuf,
        /// Device pack config word definitions to check config bits against
        #[clap(long)]
        words: Option<PathBuf>,
    },
    /// Print the pin usage report
    Report { pinmap: PathBuf },
    /// Store enhanced pin records built from the pin mappings
    Migrate {
        pinmap: PathBuf,
        /// Write the result here instead of over the configuration
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate sources from the configuration
    Generate {
        /// Directory searched before the standard template locations
        #[clap(long)]
        templates: Option<PathBuf>,
        /// Template engine executable
        #[clap(long)]
        engine: Option<String>,
        /// Engine argument, repeatable. {config}, {template} and {output} are substituted
        #[clap(long, allow_hyphen_values = true)]
        engine_arg: Vec<String>,
        /// Seconds allowed per rendered file
        #[clap(long, default_value = "30")]
        timeout: u64,
    },
}


fn init_logging(level: u8) {
    let lf = match level {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(lf)
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            let mut style = buf.style();
            let level = match record.level() {
                log::Level::Error => style.set_color(Color::Red).set_intense(true).value("ERROR"),
                log::Level::Warn =>  style.set_color(Color::Yellow).set_intense(true).value("WARN "),
                log::Level::Info =>  style.set_color(Color::Green).set_intense(true).value("INFO "),
                log::Level::Debug => style.set_color(Color::Cyan).set_intense(true).value("DEBUG"),
                log::Level::Trace => style.set_color(Color::Blue).set_intense(true).value("TRACE"),
            };

            writeln!(buf, "{} {}", level, record.args())
        })
        .init();
}

fn load_config(path: &Path) -> Result<DeviceConfig> {
    let (config, parse_error) = DeviceConfig::load_with_outcome(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    if let Some(e) = parse_error {
        warn!("{}", e);
    }
    Ok(config)
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    Catalog::load(path).with_context(|| format!("Failed to load pin mappings {}", path.display()))
}

fn show(config: &DeviceConfig) {
    let or_unset = |s: &str| if s.is_empty() { "<unset>".to_string() } else { s.to_string() };

    println!("Variant:       {}", config.variant().map(|v| v.to_string()).unwrap_or_else(|| "<unset>".into()));
    println!("Device:        {}", or_unset(config.device_name()));
    println!("Architecture:  {}", or_unset(config.device_arch()));
    println!("Family:        {}", or_unset(config.device_family()));
    println!("Series:        {}", or_unset(config.device_series()));
    if let Some(v) = config.variant() {
        println!("CPU clock:     {} Hz", v.cpu_clock_hz());
    }

    for (section, fields) in config.sections() {
        println!();
        println!("[{}]", section);
        for (key, value) in fields {
            println!("  {} = {}", key, value);
        }
    }

    let table = GpioPinTable::from_config(config);
    let used: Vec<_> = table.used_pins().collect();
    if !used.is_empty() {
        println!();
        println!("GPIO pins:");
        for pin in used {
            println!("  {:>3} {:<12} {:<8} {:<16} reg={} bit={}",
                pin.pin_number(), pin.pin_name(), pin.function_type(), pin.function_name(),
                pin.ctrl_reg_num(), pin.ctrl_reg_index());
        }
    }
}

fn run(args: Args) -> Result<()> {
    let path = args.config.as_path();

    match args.command {
        Cmd::New { variant, device } => {
            let mut config = DeviceConfig::new(variant);
            if let Some(device) = device {
                config.select_device(variant, &device)?;
            }
            config.save(path)?;
        }
        Cmd::Show => show(&load_config(path)?),
        Cmd::SetBit { name, value } => {
            let mut config = load_config(path)?;
            config.set_config_bit(&name, value);
            config.save(path)?;
        }
        Cmd::SetPrecon { name, value } => {
            let mut config = load_config(path)?;
            config.set_precon_bit(&name, value)?;
            config.save(path)?;
        }
        Cmd::SetSection { section, key, value } => {
            let mut config = load_config(path)?;
            config.set_section_value(&section, &key, value);
            config.save(path)?;
        }
        Cmd::Pin { number, function, name, function_name } => {
            let mut config = load_config(path)?;
            let mut table = GpioPinTable::from_config(&config);
            let pin = match table.pin_mut(number) {
                Some(pin) => pin,
                None => bail!("Pin {} is out of range", number),
            };
            if let Some(name) = name {
                pin.set_pin_name(&name);
            }
            pin.set_function(function);
            if let Some(function_name) = function_name {
                pin.set_function_name(&function_name);
            }
            table.store_into(&mut config);
            config.save(path)?;
        }
        Cmd::Assign { pin, function, name, package } => {
            let mut config = load_config(path)?;
            set_pin_assignment(&mut config, pin, &PinAssignment {
                pin_name: name,
                selected_function: Some(function),
                package,
            });
            config.save(path)?;
        }
        Cmd::Validate { pinmap, words: word_defs } => {
            let config = load_config(path)?;
            let catalog = load_catalog(&pinmap)?;
            let mut errors = validate::validate(&config, &catalog);
            errors.extend(validate::validate_gpio(&config, &catalog));
            if let Some(word_defs) = word_defs {
                let defs = words::load_definitions(&word_defs)?;
                errors.extend(words::check_config_bits(&config, &defs));
            }

            for e in &errors {
                println!("{}", e);
            }
            if !errors.is_empty() {
                bail!("{} validation errors", errors.len());
            }
            info!("Configuration is valid");
        }
        Cmd::Report { pinmap } => {
            let config = load_config(path)?;
            let catalog = load_catalog(&pinmap)?;
            print!("{}", report::pin_usage_report(&config, &catalog));
        }
        Cmd::Migrate { pinmap, output } => {
            let mut config = load_config(path)?;
            let catalog = load_catalog(&pinmap)?;
            let map = match validate::resolve_device(&config, &catalog) {
                Ok(map) => map,
                Err(e) => bail!("{}", e),
            };
            enhance_pin_configurations(&mut config, &map);
            config.save(output.as_deref().unwrap_or(path))?;
        }
        Cmd::Generate { templates, engine, engine_arg, timeout } => {
            let mut external = ExternalEngine::default();
            if let Some(engine) = engine {
                external.program = engine;
            }
            if !engine_arg.is_empty() {
                external.args = engine_arg;
            }
            external.timeout = Duration::from_secs(timeout);

            let mut search = TemplateSearch::standard(path);
            if let Some(dir) = templates {
                search = search.prefer(dir);
            }

            let result = render::generate(path, &external, &search);
            print!("{}", result);
            if !result.is_success() {
                bail!("{} of {} files failed to generate",
                    result.failures().count(), result.results.len());
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    run(args)
}
