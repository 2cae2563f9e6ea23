//! Device under test: pin record and model trait.
//!
//! This module defines the boundary between the harness and the bridge being verified. It
//! provides:
//! 1. **Pins:** `DutPorts`, a structural record of every signal the bridge exposes, grouped into
//!    the request stream, the completion stream and the AXI manager interface.
//! 2. **Model trait:** `Dut`, implemented by anything that can stand in for the bridge RTL.
//! 3. **Reference model:** `ReferenceBridge`, a behavioral PCIe-to-AXI bridge.

/// Behavioral PCIe-to-AXI bridge.
pub mod bridge;

use crate::axi::AxiBus;
use crate::pcie::bus::{PcieIfRxBus, PcieIfTxBus};
use crate::sim::{Clocked, Signal};

pub use bridge::ReferenceBridge;

/// Every signal on the DUT boundary.
///
/// The record is passed by `&mut` to each clocked component in turn; components read the
/// committed values and write the pending ones.
#[derive(Debug, Clone, Default)]
pub struct DutPorts {
    /// Synchronous active-high reset.
    pub rst: Signal<bool>,
    /// Request TLPs into the DUT.
    pub rx_req_tlp: PcieIfRxBus,
    /// Completion TLPs out of the DUT.
    pub tx_cpl_tlp: PcieIfTxBus,
    /// AXI manager interface.
    pub m_axi: AxiBus,
    /// Identity the DUT places in its completions (bus/device/function packed).
    pub completer_id: Signal<u16>,
    /// Negotiated max payload size, 3-bit encoding.
    pub max_payload_size: Signal<u8>,
}

impl DutPorts {
    /// Commits every signal; called by the kernel once per rising edge.
    pub fn commit(&mut self) {
        let _ = self.rst.commit();
        self.rx_req_tlp.commit();
        self.tx_cpl_tlp.commit();
        self.m_axi.commit();
        let _ = self.completer_id.commit();
        let _ = self.max_payload_size.commit();
    }
}

/// A model of the bridge under test.
///
/// The model sees the pins once per rising edge through `Clocked::on_rising_edge`.
pub trait Dut: Clocked {
    /// Returns `true` when no request or burst is buffered inside the model.
    fn is_idle(&self) -> bool;
}
