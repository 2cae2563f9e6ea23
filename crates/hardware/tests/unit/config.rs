//! # Configuration Tests
//!
//! Defaults, partial JSON, file loading and validation.

use std::io::Write;

use pcie_axi_core::common::{SimTime, TimeUnit};
use pcie_axi_core::config::*;
use pretty_assertions::assert_eq;

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.clock.period, 4);
    assert_eq!(config.clock.unit, TimeUnit::Ns);
    assert_eq!(config.reset.idle_edges, 2);
    assert_eq!(config.reset.active_edges, 2);
    assert_eq!(config.reset.settle_edges, 2);
    assert_eq!(config.pcie.bar0_size, 16 << 20);
    assert_eq!(config.axi.ram_size, 65536);
    assert_eq!(config.protocol.offset, 0x1000);
    assert_eq!(config.protocol.write_lengths, vec![1, 4, 16, 64, 256, 1024]);
    assert_eq!(config.protocol.settle, SettleMode::Acknowledged);
    assert!(config.validate().is_ok());
}

#[test]
fn test_fixed_settle_matches_reference_timing() {
    let config = Config::default();
    assert_eq!(config.protocol.fixed_settle(64), 456);
    assert_eq!(config.time(config.protocol.fixed_settle(1)), SimTime::from_ns(204));
}

#[test]
fn test_axi_addr_mask() {
    let mut bridge = BridgeConfig::default();
    assert_eq!(bridge.axi_addr_mask(), 0xFF_FFFF);
    bridge.axi_addr_width = 64;
    assert_eq!(bridge.axi_addr_mask(), u64::MAX);
}

#[test]
fn test_partial_json_keeps_defaults() {
    let config = Config::from_json(r#"{ "protocol": { "settle": "Fixed", "offset": 8192 } }"#).unwrap();
    assert_eq!(config.protocol.settle, SettleMode::FixedDelay);
    assert_eq!(config.protocol.offset, 0x2000);
    assert_eq!(config.pcie.root_max_payload, 256);
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "clock": {{ "period": 10 }}, "axi": {{ "ram_size": 131072 }} }}"#).unwrap();
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.clock.period, 10);
    assert_eq!(config.axi.ram_size, 1 << 17);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_dump_round_trips() {
    let config = Config::default();
    let text = serde_json::to_string(&config).unwrap();
    let back = Config::from_json(&text).unwrap();
    assert_eq!(back.protocol.write_lengths, config.protocol.write_lengths);
    assert_eq!(back.pcie.mem_window_base, config.pcie.mem_window_base);
}

#[test]
fn test_validation_rejects_bad_values() {
    let cases = [
        r#"{ "protocol": { "write_lengths": [] } }"#,
        r#"{ "protocol": { "write_lengths": [0] } }"#,
        r#"{ "pcie": { "bar0_size": 3000 } }"#,
        r#"{ "pcie": { "root_max_payload": 100 } }"#,
        r#"{ "axi": { "ram_size": 1000 } }"#,
        r#"{ "clock": { "period": 3 } }"#,
        r#"{ "bridge": { "axi_addr_width": 8 } }"#,
        r#"{ "protocol": { "offset": 65536, "write_lengths": [1] } }"#,
    ];
    for json in cases {
        assert!(
            matches!(Config::from_json(json), Err(ConfigError::Invalid(_))),
            "{json} should be rejected"
        );
    }
}

#[test]
fn test_malformed_json_is_parse_error() {
    assert!(matches!(Config::from_json("{"), Err(ConfigError::Parse(_))));
}

#[test]
fn test_testbench_rejects_invalid_config() {
    let mut config = Config::default();
    config.clock.period = 0;
    let err = pcie_axi_core::Testbench::new(config).unwrap_err();
    match err {
        pcie_axi_core::HarnessError::InvalidConfig(msg) => assert!(msg.contains("clock.period")),
        other => panic!("unexpected error {other}"),
    }
}
