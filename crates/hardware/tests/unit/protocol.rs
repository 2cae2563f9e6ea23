//! # Protocol Tests
//!
//! The reset/enumerate/enable/sweep driver end to end, against the reference bridge and
//! against broken DUTs.

use pcie_axi_core::common::{AccessKind, HarnessError, PcieId};
use pcie_axi_core::config::{ProtocolConfig, SettleMode};
use pcie_axi_core::tb::{ReadTest, TestState, WriteTest, run_read_test, run_write_test, write_pattern};
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::TestContext;
use crate::common::mocks::{CorruptingBridge, silent_dut};

fn sweep(lengths: &[usize], settle: SettleMode) -> ProtocolConfig {
    ProtocolConfig {
        write_lengths: lengths.to_vec(),
        settle,
        ..ProtocolConfig::default()
    }
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(16)]
#[case(64)]
#[case(256)]
#[case(1024)]
fn test_single_length_reaches_done(#[case] length: usize) {
    let mut ctx = TestContext::new();
    let report = WriteTest::new(&sweep(&[length], SettleMode::Acknowledged))
        .run(&mut ctx.tb)
        .unwrap();

    assert_eq!(report.state, TestState::Done);
    assert_eq!(report.cases.len(), 1);
    assert_eq!(report.cases[0].address, 0x1000);
    assert_eq!(
        ctx.tb.sim.axi_ram.read(0x1000, length),
        write_pattern(length)
    );
}

#[test]
fn test_default_sweep_passes() {
    let mut ctx = TestContext::new();
    let report = run_write_test(&mut ctx.tb).unwrap();

    assert_eq!(report.access, AccessKind::Write);
    assert_eq!(report.device, PcieId::new(1, 0, 0));
    assert_eq!(report.functions, 1);
    let lengths: Vec<usize> = report.cases.iter().map(|c| c.length).collect();
    assert_eq!(lengths, vec![1, 4, 16, 64, 256, 1024]);
    assert!(
        report
            .cases
            .windows(2)
            .all(|w| w[0].completed_at < w[1].completed_at)
    );
    // Later lengths overwrite the prefix of earlier ones.
    assert_eq!(ctx.tb.sim.axi_ram.read(0x1000, 1024), write_pattern(1024));
    // Each case releases the acknowledgements it settled on.
    assert!(ctx.tb.sim.axi_ram.acks().is_empty());
    assert!(ctx.tb.sim.axi_ram.ack_mark() >= 6);
}

#[test]
fn test_fixed_delay_settle() {
    let mut ctx = TestContext::new();
    let report = WriteTest::new(&sweep(&[16, 64], SettleMode::FixedDelay))
        .run(&mut ctx.tb)
        .unwrap();
    let period = ctx.tb.config.time(1);
    assert_eq!(report.cases[0].settle.as_ps(), period.as_ps() * (16 * 4 + 200));
    assert_eq!(report.cases[1].settle.as_ps(), period.as_ps() * (64 * 4 + 200));
}

#[test]
fn test_acknowledged_settle_is_shorter_than_fixed_delay() {
    let mut ctx = TestContext::new();
    let report = WriteTest::new(&sweep(&[256], SettleMode::Acknowledged))
        .run(&mut ctx.tb)
        .unwrap();
    let fixed = ctx.tb.config.time(ctx.tb.config.protocol.fixed_settle(256));
    assert!(report.cases[0].settle < fixed);
}

#[test]
fn test_read_sweep_passes() {
    let mut ctx = TestContext::new();
    let report = run_read_test(&mut ctx.tb).unwrap();
    assert_eq!(report.access, AccessKind::Read);
    assert_eq!(report.cases.len(), 6);
    assert!(report.cases.iter().all(|c| c.settle.as_ps() == 0));
}

#[test]
fn test_write_then_read_on_one_bench() {
    let mut ctx = TestContext::new();
    let _ = run_write_test(&mut ctx.tb).unwrap();
    let report = ReadTest::new(&sweep(&[4, 1024], SettleMode::Acknowledged))
        .run(&mut ctx.tb)
        .unwrap();
    assert_eq!(report.state, TestState::Done);
}

#[test]
fn test_silent_dut_times_out_on_first_write() {
    let mut ctx = TestContext::with_dut(Box::new(silent_dut()));
    let failure = run_write_test(&mut ctx.tb).unwrap_err();

    assert_eq!(
        failure.state,
        TestState::Length {
            access: AccessKind::Write,
            length: 1
        }
    );
    assert!(matches!(failure.error, HarnessError::ProtocolTimeout { .. }));
    assert!(failure.completed.is_empty());
    assert!(failure.to_string().starts_with("WRITE_LENGTH_1 failed"));
}

#[test]
fn test_silent_dut_times_out_on_first_read() {
    let mut ctx = TestContext::with_dut(Box::new(silent_dut()));
    let failure = run_read_test(&mut ctx.tb).unwrap_err();
    assert_eq!(failure.state.to_string(), "READ_LENGTH_1");
    assert!(matches!(failure.error, HarnessError::ProtocolTimeout { .. }));
}

#[test]
fn test_corrupted_data_is_a_mismatch() {
    let mut ctx = TestContext::with_dut(Box::new(CorruptingBridge::new()));
    let failure = run_write_test(&mut ctx.tb).unwrap_err();

    let HarnessError::DataMismatch(mismatch) = failure.error else {
        panic!("expected a data mismatch, got {}", failure.error);
    };
    assert_eq!(mismatch.access, AccessKind::Write);
    assert_eq!(mismatch.length, 1);
    assert_eq!(mismatch.address, 0x1000);
    assert_eq!(mismatch.expected, vec![0]);
    assert_eq!(mismatch.actual, vec![0xEE]);
    assert_eq!(mismatch.diverging_range(), Some(0..1));
}

#[test]
fn test_out_of_window_offset_fails_the_case() {
    let mut ctx = TestContext::new();
    // Past what validation accepts, so set it on the built bench.
    ctx.tb.config.protocol.offset = ctx.tb.config.pcie.bar0_size - 8;
    let failure = run_write_test(&mut ctx.tb).unwrap_err();

    assert_eq!(failure.state.to_string(), "WRITE_LENGTH_16");
    assert_eq!(failure.completed.len(), 2);
    assert!(matches!(failure.error, HarnessError::BarOutOfRange { .. }));
}

#[test]
fn test_state_names() {
    assert_eq!(TestState::Init.to_string(), "INIT");
    assert_eq!(TestState::Reset.to_string(), "RESET");
    assert_eq!(TestState::Enabled.to_string(), "ENABLED");
    assert_eq!(TestState::Done.to_string(), "DONE");
    assert_eq!(TestState::Failed.to_string(), "FAILED");
    let r = TestState::Length {
        access: AccessKind::Read,
        length: 1024,
    };
    assert_eq!(r.to_string(), "READ_LENGTH_1024");
}
