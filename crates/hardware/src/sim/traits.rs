//! Clocked component trait.
//!
//! Everything that samples the DUT pins implements `Clocked`: the root complex (which ticks
//! its ports and endpoints), the DUT model and the AXI memory. The kernel calls
//! `on_rising_edge` on each of them once per rising edge and then commits the wires.

use crate::common::SimTime;
use crate::dut::DutPorts;

/// A component that runs once per rising clock edge.
///
/// Implementations read the committed value of every signal and write only pending values,
/// so the order in which the kernel visits components does not matter.
pub trait Clocked {
    /// Returns a short name for logs (e.g., `"root-complex"`, `"axi-ram"`).
    fn name(&self) -> &str;

    /// Samples inputs and drives outputs for the rising edge at `now`.
    fn on_rising_edge(&mut self, ports: &mut DutPorts, now: SimTime);
}

/// A host with nothing to drive; used when the kernel runs without a root complex.
#[derive(Debug, Default, Clone, Copy)]
pub struct Idle;

impl Clocked for Idle {
    fn name(&self) -> &str {
        "idle"
    }

    fn on_rising_edge(&mut self, _ports: &mut DutPorts, _now: SimTime) {}
}
