//! # Kernel Tests
//!
//! Clock edges, timers and `run_until` driven through a full `Simulator`.

use pcie_axi_core::common::{HarnessError, SimTime};
use pcie_axi_core::config::Config;
use pcie_axi_core::dut::{Dut, ReferenceBridge};
use pcie_axi_core::sim::{EventKind, Idle, Simulator};

fn kernel() -> Simulator {
    let config = Config::default();
    Simulator::new(&config, Box::new(ReferenceBridge::new(&config.bridge)))
}

#[test]
fn test_first_edge_at_half_period() {
    let mut sim = kernel();
    assert_eq!(sim.step(&mut Idle), Some(EventKind::RisingEdge));
    assert_eq!(sim.now(), SimTime::from_ns(2));
    assert_eq!(sim.step(&mut Idle), Some(EventKind::FallingEdge));
    assert_eq!(sim.now(), SimTime::from_ns(4));
}

#[test]
fn test_wait_edges_counts_rising_edges() {
    let mut sim = kernel();
    sim.wait_edges(&mut Idle, 5);
    assert_eq!(sim.cycles(), 5);
    assert_eq!(sim.now(), SimTime::from_ns(18));
}

#[test]
fn test_wait_for_advances_exactly() {
    let mut sim = kernel();
    sim.wait_for(&mut Idle, SimTime::from_ns(456));
    assert_eq!(sim.now(), SimTime::from_ns(456));
    assert_eq!(sim.cycles(), 114);
}

#[test]
fn test_run_until_times_out() {
    let mut sim = kernel();
    let err = sim
        .run_until(&mut Idle, SimTime::from_ns(100), "nothing", |_, _| false)
        .unwrap_err();
    match err {
        HarnessError::ProtocolTimeout { what, waited } => {
            assert_eq!(what, "nothing");
            assert!(waited >= SimTime::from_ns(100));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_run_until_returns_when_predicate_holds() {
    let mut sim = kernel();
    sim.run_until(&mut Idle, SimTime::from_ns(1_000), "ten edges", |s, _| s.cycles() >= 10)
        .unwrap();
    assert_eq!(sim.cycles(), 10);
}

#[test]
fn test_reset_pin_is_visible_after_set_immediate() {
    let mut sim = kernel();
    sim.ports.rst.set_immediate(true);
    sim.wait_edges(&mut Idle, 1);
    assert!(sim.ports.rst.get());
    assert!(sim.dut.is_idle());
}
