//! # PCIe Tests
//!
//! Enumeration, lookup, enablement and BAR window transactions through a full bench.

use pcie_axi_core::common::constants::{cfg, command};
use pcie_axi_core::common::{HarnessError, PcieId};
use pcie_axi_core::config::Config;
use pcie_axi_core::dut::ReferenceBridge;
use pcie_axi_core::pcie::{BarKind, CplStatus, HardwareIds, PcieIfDevice, RootComplex};
use pcie_axi_core::sim::Simulator;
use pcie_axi_core::Testbench;
use pretty_assertions::assert_eq;

use crate::common::harness::{TestContext, quick_config};

const F0: PcieId = PcieId::new(1, 0, 0);

#[test]
fn test_enumeration_discovers_the_configured_function() {
    let mut ctx = TestContext::new();
    ctx.tb.cycle_reset();
    assert_eq!(ctx.tb.enumerate().unwrap(), 1);

    let device = ctx.tb.rc.find_device(F0).unwrap();
    assert_eq!(device.ids.vendor_id, 0x1234);
    assert_eq!(device.ids.device_id, 0x0001);
    assert_eq!(device.ids.class_code, 0x05_8000);
    assert_eq!(device.max_payload, 256);
    assert_eq!(device.max_read_request, 512);
    assert!(!device.enabled);

    let bar0 = device.bar_window(0).unwrap();
    assert_eq!(bar0.base, 0x8000_0000);
    assert_eq!(bar0.size, 16 << 20);
    assert_eq!(bar0.kind, BarKind::Memory64);
    assert_eq!(
        device.bar_window(2),
        Err(HarnessError::BarNotPresent { id: F0, index: 2 })
    );

    assert_eq!(ctx.tb.function_id(0), Some(F0));
}

#[test]
fn test_unknown_identity_is_a_lookup_error() {
    let mut ctx = TestContext::new();
    ctx.tb.cycle_reset();
    let _ = ctx.tb.enumerate().unwrap();
    let other = PcieId::new(2, 0, 0);
    assert_eq!(ctx.tb.rc.find_device(other), Err(HarnessError::DeviceNotFound(other)));
}

#[test]
fn test_lookup_before_enumeration_fails() {
    let mut ctx = TestContext::new();
    ctx.tb.cycle_reset();
    assert_eq!(ctx.tb.rc.find_device(F0), Err(HarnessError::DeviceNotFound(F0)));
    assert!(matches!(
        ctx.tb.rc.enable_device(&mut ctx.tb.sim, F0),
        Err(HarnessError::DeviceNotFound(_))
    ));
}

#[test]
fn test_write_before_enable_is_rejected() {
    let mut ctx = TestContext::new();
    ctx.tb.cycle_reset();
    let _ = ctx.tb.enumerate().unwrap();
    let window = ctx.tb.rc.find_device(F0).unwrap().bar_window(0).unwrap();
    let err = window
        .write(&mut ctx.tb.rc, &mut ctx.tb.sim, 0x1000, &[1, 2, 3])
        .unwrap_err();
    assert_eq!(err, HarnessError::DeviceNotEnabled(F0));
    assert_eq!(ctx.tb.rc.stats().memory_writes, 0);
}

#[test]
fn test_enable_sets_command_bits() {
    let mut ctx = TestContext::new();
    let _ = ctx.bring_up();
    let value = ctx
        .tb
        .rc
        .config_read(&mut ctx.tb.sim, F0, cfg::STATUS_COMMAND)
        .unwrap();
    let bits = u32::from(command::MEMORY_ENABLE | command::BUS_MASTER);
    assert_eq!(value & bits, bits);
    assert!(ctx.tb.rc.find_device(F0).unwrap().enabled);
}

#[test]
fn test_reenumeration_after_reset_is_idempotent() {
    let mut ctx = TestContext::new();
    ctx.tb.cycle_reset();
    let _ = ctx.tb.enumerate().unwrap();
    let first = ctx.tb.rc.find_device(F0).unwrap();

    ctx.tb.cycle_reset();
    assert_eq!(ctx.tb.enumerate().unwrap(), 1);
    let second = ctx.tb.rc.find_device(F0).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_bar_is_locked_after_enumeration() {
    let mut ctx = TestContext::new();
    ctx.tb.cycle_reset();
    let _ = ctx.tb.enumerate().unwrap();
    let port = ctx.tb.port();
    let mut function = ctx.tb.rc.endpoint(port).unwrap().functions()[0].clone();
    assert!(function.is_locked());
    assert_eq!(
        function.configure_bar(0, 1 << 20),
        Err(HarnessError::BarLocked { id: F0, index: 0 })
    );
}

#[test]
fn test_no_endpoint_is_enumeration_failure() {
    let config = quick_config();
    let mut sim = Simulator::new(&config, Box::new(ReferenceBridge::new(&config.bridge)));
    let mut rc = RootComplex::new(&config);
    assert_eq!(
        rc.enumerate(&mut sim),
        Err(HarnessError::EnumerationFailure { ports: 0 })
    );
}

#[test]
fn test_multi_function_device_enumerates_every_function() {
    let config = quick_config();
    let mut device = PcieIfDevice::new(&config.pcie);
    device.configure_bar(0, 1 << 20).unwrap();
    let second = device.add_function(
        HardwareIds {
            vendor_id: 0x1234,
            device_id: 0x0002,
            class_code: 0x05_8000,
            ..HardwareIds::default()
        },
        128,
    );
    second
        .configure_bar_with(0, 0x1000, BarKind::Memory32, true)
        .unwrap();
    second.configure_bar_with(1, 0x100, BarKind::Io, false).unwrap();

    let dut = Box::new(ReferenceBridge::new(&config.bridge));
    let mut tb = Testbench::with_device(config, dut, device).unwrap();
    tb.cycle_reset();
    assert_eq!(tb.enumerate().unwrap(), 2);

    let f1 = tb.rc.find_device(F0.with_function(1)).unwrap();
    assert_eq!(f1.ids.device_id, 0x0002);
    assert_eq!(f1.max_payload, 128);
    let mem = f1.bar_window(0).unwrap();
    assert_eq!(mem.kind, BarKind::Memory32);
    assert!(mem.prefetchable);
    assert_eq!(mem.size, 0x1000);
    assert_eq!(mem.base % 0x1000, 0);
    let io = f1.bar_window(1).unwrap();
    assert_eq!(io.kind, BarKind::Io);
    assert_eq!(io.size, 0x100);

    tb.rc.enable_device(&mut tb.sim, io.function).unwrap();
    assert_eq!(
        io.write(&mut tb.rc, &mut tb.sim, 0, &[0]),
        Err(HarnessError::UnsupportedBarKind {
            id: io.function,
            index: 1
        })
    );
}

#[test]
fn test_absent_function_answers_unsupported_request() {
    let mut ctx = TestContext::new();
    ctx.tb.cycle_reset();
    let err = ctx
        .tb
        .rc
        .config_read(&mut ctx.tb.sim, F0.with_function(3), cfg::ID)
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::CompletionFailed {
            status: CplStatus::UnsupportedRequest,
            ..
        }
    ));
}

#[test]
fn test_config_request_to_nonzero_device_is_unsupported() {
    let mut ctx = TestContext::new();
    let _ = ctx.bring_up();
    let err = ctx
        .tb
        .rc
        .config_read(&mut ctx.tb.sim, PcieId::new(1, 5, 0), cfg::ID)
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::CompletionFailed {
            status: CplStatus::UnsupportedRequest,
            ..
        }
    ));
    assert_eq!(ctx.tb.function_id(0), Some(F0));
    assert!(ctx.tb.rc.find_device(F0).is_ok());
}

#[test]
fn test_wrong_completer_identity_is_not_matched() {
    let mut ctx = TestContext::new();
    let window = ctx.bring_up();
    let at = ctx.axi(&window, 0x2000);
    ctx.tb.sim.axi_ram.write(at, &[9, 8, 7, 6]);

    ctx.tb.set_completer_id(PcieId::new(0x7E, 0x1F, 7));
    let err = window
        .read(&mut ctx.tb.rc, &mut ctx.tb.sim, 0x2000, 4)
        .unwrap_err();
    assert!(matches!(err, HarnessError::ProtocolTimeout { .. }));
    assert_eq!(ctx.tb.rc.stats().unexpected_completions, 1);

    ctx.tb.set_completer_id(F0);
    let got = window
        .read(&mut ctx.tb.rc, &mut ctx.tb.sim, 0x2000, 4)
        .unwrap();
    assert_eq!(got, vec![9, 8, 7, 6]);
}

#[test]
fn test_unprogrammed_completer_identity_fails_reads() {
    let mut ctx = TestContext::new();
    ctx.tb.cycle_reset();
    let _ = ctx.tb.enumerate().unwrap();
    let mut device = ctx.tb.rc.find_device(F0).unwrap();
    device.enable_device(&mut ctx.tb.rc, &mut ctx.tb.sim).unwrap();
    let window = device.bar_window(0).unwrap();

    let err = window
        .read(&mut ctx.tb.rc, &mut ctx.tb.sim, 0x2000, 4)
        .unwrap_err();
    assert!(matches!(err, HarnessError::ProtocolTimeout { .. }));
}

#[test]
fn test_out_of_window_access_is_rejected() {
    let mut ctx = TestContext::new();
    let window = ctx.bring_up();
    let err = window
        .write(&mut ctx.tb.rc, &mut ctx.tb.sim, window.size - 2, &[0; 4])
        .unwrap_err();
    assert!(matches!(err, HarnessError::BarOutOfRange { index: 0, .. }));
}

#[test]
fn test_writes_split_on_page_and_payload_boundaries() {
    let mut ctx = TestContext::new();
    let window = ctx.bring_up();
    let before = ctx.tb.rc.stats().memory_writes;
    let data: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
    ctx.write_and_drain(&window, 0x1F80, &data);

    // 0x80 up to the page boundary, then 256-byte payloads.
    assert_eq!(ctx.tb.rc.stats().memory_writes - before, 5);
    let at = ctx.axi(&window, 0x1F80);
    assert_eq!(ctx.tb.sim.axi_ram.read(at, data.len()), data);
}

#[test]
fn test_read_back_through_bar_window() {
    let mut ctx = TestContext::new();
    let window = ctx.bring_up();
    let data: Vec<u8> = (0..700).map(|i| (i * 7 % 256) as u8).collect();
    let at = ctx.axi(&window, 0x2003);
    ctx.tb.sim.axi_ram.write(at, &data);

    let got = window
        .read(&mut ctx.tb.rc, &mut ctx.tb.sim, 0x2003, data.len())
        .unwrap();
    assert_eq!(got, data);
    assert_eq!(ctx.tb.rc.stats().unexpected_completions, 0);
}

#[test]
fn test_unexpected_completion_is_counted() {
    let mut ctx = TestContext::new();
    let _ = ctx.bring_up();
    let port = ctx.tb.port();
    let stray = pcie_axi_core::pcie::Tlp::mem_read(PcieId::default(), 200, 0x8000_0000, 4);
    ctx.tb.rc.send_raw(port, stray).unwrap();
    ctx.tb.wait_edges(200);
    assert_eq!(ctx.tb.rc.stats().unexpected_completions, 1);
}

#[test]
fn test_missing_port_is_reported() {
    let config = Config::default();
    let mut rc = RootComplex::new(&config);
    let tlp = pcie_axi_core::pcie::Tlp::mem_read(PcieId::default(), 0, 0, 4);
    assert_eq!(rc.send_raw(3, tlp), Err(HarnessError::PortNotFound(3)));
}
