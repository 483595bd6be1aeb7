// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use pic32cfg::config::gpio::{FunctionType, GpioPinTable, GPIO_SECTION};
use pic32cfg::config::migrate::enhance_pin_configurations;
use pic32cfg::config::pins::{PinRecord, ENHANCED_KEY, PIN_CONFIG_SECTION};
use pic32cfg::validate::{resolve_device, validate, validate_gpio};
use pic32cfg::{report, Catalog, DeviceConfig, ValidationError, Variant};

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn scratch_dir(name: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir()
        .join(format!("pic32cfg-it-{}-{}-{}", name, std::process::id(), n));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// ---------------------------------------------------------------------------
// Loading and saving
// ---------------------------------------------------------------------------

#[test]
fn demo_document_loads_with_pascal_case_keys() {
    let config = DeviceConfig::load(demo("device_config.json")).unwrap();
    assert_eq!(config.variant(), Some(Variant::MZ));
    assert_eq!(config.device_name(), "PIC32MZ2048EFH064");
    assert_eq!(config.device_arch(), "MIPS");
    assert_eq!(config.device_family(), "PIC32MZEF");
    assert_eq!(config.section_value("DEVCFG1", "FNOSC"), Some("SPLL"));
}

#[test]
fn flat_values_win_over_sections() {
    let config = DeviceConfig::load(demo("device_config.json")).unwrap();

    // Present in both, the flat value stays
    assert_eq!(config.config_bit("DEBUG"), Some("OFF"));
    assert_eq!(config.section_value("DEVCFG0", "DEBUG"), Some("ON"));
    assert_eq!(config.precon_bit("PFMWS"), Some("2"));

    // Only in a section, mirrored into the flat view
    assert_eq!(config.config_bit("ICESEL"), Some("ICS_PGx1"));
    assert_eq!(config.config_bit("FPLLMULT"), Some("MUL_50"));
}

#[test]
fn save_then_load_keeps_sections() {
    let config = DeviceConfig::load(demo("device_config.json")).unwrap();

    for file in ["device_config.json", "device_config.yaml"] {
        let path = scratch_dir("roundtrip").join(file);
        config.save(&path).unwrap();
        let reloaded = DeviceConfig::load(&path).unwrap();
        assert_eq!(reloaded.sections(), config.sections(), "{}", file);
        assert_eq!(reloaded.config_bits(), config.config_bits(), "{}", file);
        assert_eq!(reloaded.precon_bits(), config.precon_bits(), "{}", file);
        assert_eq!(reloaded.device_name(), config.device_name(), "{}", file);
    }
}

#[test]
fn flat_only_document_stays_flat() {
    let dir = scratch_dir("flat");
    let path = dir.join("device_config.json");
    std::fs::write(&path, r#"{
        "variant": "MX",
        "deviceName": "PIC32MX795F512L",
        "configBits": { "FWDTEN": "OFF", "POSCMOD": "XT" },
        "preconBits": {}
    }"#).unwrap();

    let config = DeviceConfig::load(&path).unwrap();
    assert!(config.sections().is_empty());
    config.save(&path).unwrap();

    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(doc.get("sections").is_none());
    assert_eq!(doc["configBits"]["FWDTEN"], "OFF");
    assert_eq!(doc["deviceFamily"], "PIC32MX7XX");
}

#[test]
fn upper_case_yaml_extension_is_yaml() {
    let path = scratch_dir("upper-yaml").join("DEVICE_CONFIG.YAML");
    let mut config = DeviceConfig::new(Variant::MX);
    config.set_config_bit("FWDTEN", "OFF");
    config.save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&text).is_err(), "{}", text);
    assert!(text.contains("configBits:"), "{}", text);
    assert_eq!(DeviceConfig::load(&path).unwrap().config_bit("FWDTEN"), Some("OFF"));
}

#[test]
fn unparsable_document_loads_empty() {
    let path = scratch_dir("broken").join("device_config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let (config, err) = DeviceConfig::load_with_outcome(&path).unwrap();
    assert!(config.is_empty());
    assert!(err.is_some());
}

#[test]
fn missing_document_is_an_error() {
    let path = scratch_dir("missing").join("device_config.json");
    assert!(DeviceConfig::load(&path).is_err());
}

// ---------------------------------------------------------------------------
// GPIO
// ---------------------------------------------------------------------------

#[test]
fn gpio_table_survives_save() {
    let path = scratch_dir("gpio").join("device_config.json");
    let mut config = DeviceConfig::new(Variant::MZ);

    let mut table = GpioPinTable::from_config(&config);
    table.pin_mut(33).unwrap().set_function(FunctionType::Led);
    table.pin_mut(7).unwrap().set_function(FunctionType::UartTx);
    table.pin_mut(7).unwrap().set_function_name("DEBUG_TX");
    table.store_into(&mut config);
    config.save(&path).unwrap();

    let table = GpioPinTable::from_config(&DeviceConfig::load(&path).unwrap());
    let used: Vec<_> = table.used_pins()
        .map(|p| (p.pin_number(), p.function_name().to_string(), p.ctrl_reg_num(), p.ctrl_reg_index()))
        .collect();
    assert_eq!(used, vec![
        (7, "DEBUG_TX".to_string(), 0, 6),
        (33, "LED_33".to_string(), 1, 0),
    ]);
}

#[test]
fn unused_gpio_table_writes_no_section() {
    let mut config = DeviceConfig::new(Variant::MX);
    let mut table = GpioPinTable::new();
    table.pin_mut(3).unwrap().set_function(FunctionType::Pwm);
    table.store_into(&mut config);
    assert!(config.section(GPIO_SECTION).is_some());

    table.pin_mut(3).unwrap().set_function(FunctionType::None);
    table.store_into(&mut config);
    assert!(config.section(GPIO_SECTION).is_none());
}

// ---------------------------------------------------------------------------
// Pin mappings
// ---------------------------------------------------------------------------

#[test]
fn demo_configuration_is_valid() {
    let config = DeviceConfig::load(demo("device_config.json")).unwrap();
    let catalog = Catalog::load(demo("pin_mappings.json")).unwrap();
    assert_eq!(validate(&config, &catalog), vec![]);
    assert_eq!(validate_gpio(&config, &catalog), vec![]);
}

#[test]
fn read_only_pin_reports_one_error() {
    let mut config = DeviceConfig::load(demo("device_config.json")).unwrap();
    let catalog = Catalog::load(demo("pin_mappings.json")).unwrap();
    config.set_section_value(PIN_CONFIG_SECTION, "2", r#"{"SelectedFunction":"GPIO"}"#);

    assert_eq!(validate(&config, &catalog), vec![
        ValidationError::ReadOnlyPin { pin: 2, required: "VDD".to_string() },
    ]);
}

#[test]
fn enhance_merges_catalog_data() {
    let mut config = DeviceConfig::load(demo("device_config.json")).unwrap();
    let catalog = Catalog::load(demo("pin_mappings.json")).unwrap();
    let map = resolve_device(&config, &catalog).unwrap();
    assert_eq!(map.package(), "64-pin");

    assert_eq!(enhance_pin_configurations(&mut config, &map), 4);

    let doc = config.section_value(PIN_CONFIG_SECTION, ENHANCED_KEY).unwrap();
    let records: std::collections::BTreeMap<u32, PinRecord> = serde_json::from_str(doc).unwrap();
    match &records[&3] {
        PinRecord::Enhanced(pin) => {
            assert_eq!(pin.selected_function, "UART_TX");
            assert_eq!(pin.port.as_deref(), Some("RG"));
            assert_eq!(pin.peripheral_mappings.get("UART"), Some("U2TX"));
            assert_eq!(pin.package, "64-pin");
        }
        other => panic!("unexpected {:?}", other),
    }

    // The original entries are still there and still validate
    assert_eq!(validate(&config, &catalog), vec![]);
}

#[test]
fn report_lists_demo_pins() {
    let config = DeviceConfig::load(demo("device_config.json")).unwrap();
    let catalog = Catalog::load(demo("pin_mappings.json")).unwrap();
    let text = report::pin_usage_report(&config, &catalog);

    assert!(text.starts_with("Pin Usage Report\n"));
    assert!(text.contains("Package: 64-pin"));
    assert!(text.contains("  UART:\n    Pin 3 (U2TX)\n"));
}
